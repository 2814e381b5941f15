use std::fmt;

/// Lifecycle of an engine session.
///
/// `Stopped → Starting → AwaitingHandshake → Ready ⇄ Analyzing`, with
/// `Faulted` reachable from anywhere a transport can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Stopped,
    Starting,
    AwaitingHandshake,
    Ready,
    Analyzing,
    Faulted,
}

impl SessionState {
    /// Whether search and position commands are accepted.
    #[must_use]
    pub fn accepts_commands(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Analyzing)
    }

    /// Whether `start` may be called.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Faulted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::AwaitingHandshake => "awaiting handshake",
            SessionState::Ready => "ready",
            SessionState::Analyzing => "analyzing",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}
