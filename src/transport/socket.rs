use std::io::{LineWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use super::{LineReader, Transport};
use crate::error::TransportError;

/// An engine served over TCP, one protocol line per text line.
pub struct SocketTransport {
    writer: Option<LineWriter<TcpStream>>,
    reader: Option<LineReader>,
    endpoint: String,
}

impl SocketTransport {
    /// Connect to `host:port`, trying each resolved address in turn.
    ///
    /// Reads time out after `read_timeout` so the background reader can
    /// notice shutdown while the engine is idle.
    pub fn connect(
        host: &str,
        port: u16,
        read_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = format!("{host}:{port}");
        let connect_error = |source| TransportError::Connect {
            target: endpoint.clone(),
            source: Arc::new(source),
        };

        let addrs = (host, port).to_socket_addrs().map_err(connect_error)?;
        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let stream = match stream {
            Some(stream) => stream,
            None => {
                let source = last_error.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
                });
                return Err(connect_error(source));
            }
        };

        stream.set_nodelay(true).map_err(connect_error)?;
        let read_half = stream.try_clone().map_err(connect_error)?;
        read_half
            .set_read_timeout(Some(read_timeout.max(Duration::from_millis(1))))
            .map_err(connect_error)?;
        log::info!("connected to engine at {endpoint}");

        Ok(SocketTransport {
            writer: Some(LineWriter::new(stream)),
            reader: Some(LineReader::new(read_half)),
            endpoint,
        })
    }
}

impl Transport for SocketTransport {
    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writeln!(writer, "{text}")
            .and_then(|()| writer.flush())
            .map_err(|source| TransportError::Write {
                command: text.to_string(),
                source: Arc::new(source),
            })
    }

    fn take_reader(&mut self) -> Option<LineReader> {
        self.reader.take()
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            let stream = writer.get_ref();
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                log::debug!("socket to {} already closed: {e}", self.endpoint);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_connect_refused_is_connect_error() {
        // Bind then drop to find a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let result = SocketTransport::connect(
            "127.0.0.1",
            port,
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_lines_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut stream = stream;
            // Two lines in one write.
            stream.write_all(b"id name Loopback\nreadyok\n").unwrap();
            line
        });

        let mut transport = SocketTransport::connect(
            "127.0.0.1",
            port,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .unwrap();
        let mut reader = transport.take_reader().unwrap();
        transport.write_line("isready").unwrap();

        let mut lines = Vec::new();
        while lines.len() < 2 {
            if let Some(line) = reader.read_line().unwrap() {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["id name Loopback", "readyok"]);
        assert_eq!(server.join().unwrap(), "isready\n");

        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert!(matches!(
            transport.write_line("stop"),
            Err(TransportError::Closed)
        ));
    }
}
