//! Error types for engine sessions and their transports.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::session::SessionState;

/// Failures raised by a transport while opening, writing or reading.
///
/// I/O causes are shared so errors can be both returned to the caller and
/// queued for the host.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The engine executable could not be spawned
    #[error("failed to launch engine '{target}': {source}")]
    Launch {
        target: String,
        #[source]
        source: Arc<io::Error>,
    },
    /// The TCP endpoint could not be reached
    #[error("failed to connect to engine at {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: Arc<io::Error>,
    },
    /// Writing a command failed (stream closed or process exited)
    #[error("failed to write command '{command}': {source}")]
    Write {
        command: String,
        #[source]
        source: Arc<io::Error>,
    },
    /// The transport was already closed
    #[error("transport is closed")]
    Closed,
    /// The engine closed its output stream
    #[error("engine output reached end of stream")]
    EndOfStream,
    /// Reading engine output failed
    #[error("failed to read engine output: {0}")]
    Read(#[source] Arc<io::Error>),
}

/// Failures surfaced by [`crate::EngineSession`] operations.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The transport failed while starting or talking to the engine
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Operation not allowed in the current state
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// A search command was issued before the handshake completed
    #[error("engine is not ready (session is {state})")]
    NotReady { state: SessionState },
    /// An infinite search was requested while another search is running
    #[error("engine is already analyzing")]
    AlreadyAnalyzing,
    /// Configuration can only be applied before the handshake completes
    #[error("engine is not ready for reconfiguration (session is {state})")]
    NotReadyForReconfiguration { state: SessionState },
    /// The connection dropped mid-session
    #[error("engine disconnected: {message}")]
    Disconnected { message: String },
}

/// Failures while building configuration from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No setting has this name
    #[error("unknown engine option '{name}'")]
    UnknownOption { name: String },
    /// The value does not parse for this setting
    #[error("invalid value '{value}' for option '{name}'")]
    InvalidValue { name: String, value: String },
    /// Missing `=` or empty name
    #[error("expected 'name=value', found '{found}'")]
    MalformedAssignment { found: String },
    /// Not an executable path or `host:port`
    #[error("invalid engine target '{found}'")]
    InvalidTarget { found: String },
}
