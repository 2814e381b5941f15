//! Client-side controller for external UCI chess engines.
//!
//! Starts an engine as a child process or reaches it over TCP, runs the UCI
//! handshake and searches, and hands engine output back to a single host
//! thread through a dispatch queue.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sync;
pub mod transport;

pub use config::{EngineConfig, SessionOptions};
pub use dispatch::DispatchQueue;
pub use error::{ConfigError, SessionError, TransportError};
pub use protocol::{parse, Position, ProtocolEvent, UciCommand};
pub use registry::SessionRegistry;
pub use session::{EngineSession, EventKind, SessionEvent, SessionState, SubscriptionId};
pub use transport::{Connector, SystemConnector, Transport, TransportTarget};
