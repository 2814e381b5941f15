//! Byte-stream transports to an engine: a child process or a TCP socket.
//!
//! Both variants expose the same operations. The write half stays with the
//! session on the host thread; the read half is handed to the background
//! reader as a [`LineReader`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, TransportError};

mod line_reader;
mod process;
mod socket;

pub use line_reader::LineReader;
pub use process::ProcessTransport;
pub use socket::SocketTransport;

/// Where the engine lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// Executable spawned directly, without a shell
    Process { program: PathBuf, args: Vec<String> },
    /// Engine served over TCP
    Socket { host: String, port: u16 },
}

impl TransportTarget {
    /// Executable with no arguments.
    pub fn process(program: impl Into<PathBuf>) -> Self {
        TransportTarget::Process {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// TCP endpoint.
    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        TransportTarget::Socket {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportTarget::Process { program, .. } => write!(f, "{}", program.display()),
            TransportTarget::Socket { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for TransportTarget {
    type Err = ConfigError;

    /// `tcp://host:port` or `host:port` selects a socket; anything else is an
    /// executable path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidTarget {
                found: s.to_string(),
            });
        }

        let explicit = trimmed.strip_prefix("tcp://");
        let endpoint = explicit.unwrap_or(trimmed);
        if let Some((host, port)) = endpoint.rsplit_once(':') {
            match port.parse::<u16>() {
                Ok(port) if !host.is_empty() => return Ok(TransportTarget::socket(host, port)),
                _ if explicit.is_some() => {
                    return Err(ConfigError::InvalidTarget {
                        found: s.to_string(),
                    })
                }
                _ => {}
            }
        } else if explicit.is_some() {
            return Err(ConfigError::InvalidTarget {
                found: s.to_string(),
            });
        }

        Ok(TransportTarget::process(trimmed))
    }
}

/// An open connection to an engine.
pub trait Transport: Send {
    /// Send one command line, newline-terminated and flushed.
    fn write_line(&mut self, text: &str) -> Result<(), TransportError>;

    /// Detach the read half for the background reader. Returns `None` once
    /// taken.
    fn take_reader(&mut self) -> Option<LineReader>;

    /// Release OS resources. Safe to call more than once.
    fn close(&mut self);

    /// Whether `close` has run.
    fn is_closed(&self) -> bool;
}

/// Opens transports for a session.
pub trait Connector: Send {
    /// Open `target`. Socket reads give up after `read_timeout` so the
    /// reader can notice a halt while the engine is quiet.
    fn open(
        &self,
        target: &TransportTarget,
        read_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Opens real processes and sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    fn open(
        &self,
        target: &TransportTarget,
        read_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        match target {
            TransportTarget::Process { program, args } => {
                Ok(Box::new(ProcessTransport::spawn(program, args)?))
            }
            TransportTarget::Socket { host, port } => Ok(Box::new(SocketTransport::connect(
                host,
                *port,
                read_timeout,
                connect_timeout,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explicit_socket() {
        assert_eq!(
            "tcp://127.0.0.1:4000".parse::<TransportTarget>().unwrap(),
            TransportTarget::socket("127.0.0.1", 4000)
        );
    }

    #[test]
    fn test_parse_bare_host_port() {
        assert_eq!(
            "engines.local:9000".parse::<TransportTarget>().unwrap(),
            TransportTarget::socket("engines.local", 9000)
        );
    }

    #[test]
    fn test_parse_executable_path() {
        assert_eq!(
            "/usr/games/stockfish".parse::<TransportTarget>().unwrap(),
            TransportTarget::process("/usr/games/stockfish")
        );
        assert_eq!(
            "C:\\engines\\stockfish.exe".parse::<TransportTarget>().unwrap(),
            TransportTarget::process("C:\\engines\\stockfish.exe")
        );
    }

    #[test]
    fn test_parse_invalid_targets() {
        assert!("".parse::<TransportTarget>().is_err());
        assert!("tcp://nowhere".parse::<TransportTarget>().is_err());
        assert!("tcp://host:notaport".parse::<TransportTarget>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransportTarget::socket("localhost", 1234).to_string(),
            "tcp://localhost:1234"
        );
        assert_eq!(TransportTarget::process("stockfish").to_string(), "stockfish");
    }
}
