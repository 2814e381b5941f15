//! Per-kind callback lists for session events.
//!
//! Handlers run on the host thread during [`super::EngineSession::poll`], so
//! they need not be `Send`.

use crate::error::SessionError;

/// What the host sees after a drain.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The handshake completed
    Ready,
    /// A search finished with `mv`; `ponder` is the expected reply, if given
    BestMove { mv: String, ponder: Option<String> },
    /// Normalized evaluation in `[0, 1]`
    Evaluation(f64),
    /// Engine output with no typed meaning
    RawLine(String),
    /// A failed operation or a lost connection
    Error(SessionError),
}

/// Discriminant of [`SessionEvent`], used to pick subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`SessionEvent::Ready`]
    Ready,
    /// [`SessionEvent::BestMove`]
    BestMove,
    /// [`SessionEvent::Evaluation`]
    Evaluation,
    /// [`SessionEvent::RawLine`]
    RawLine,
    /// [`SessionEvent::Error`]
    Error,
}

impl SessionEvent {
    /// Which subscriber list this event goes to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Ready => EventKind::Ready,
            SessionEvent::BestMove { .. } => EventKind::BestMove,
            SessionEvent::Evaluation(_) => EventKind::Evaluation,
            SessionEvent::RawLine(_) => EventKind::RawLine,
            SessionEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&SessionEvent)>;

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventKind, Handler)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, kind, handler));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _, _)| *sid != id);
        self.handlers.len() != before
    }

    /// Call every handler registered for the event's kind, in registration order.
    pub(crate) fn notify(&mut self, event: &SessionEvent) {
        let kind = event.kind();
        for (_, _, handler) in self.handlers.iter_mut().filter(|(_, k, _)| *k == kind) {
            handler(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}
