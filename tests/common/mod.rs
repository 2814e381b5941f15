use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use uci_session::{EngineSession, EventKind, SessionEvent};

pub const TICK: Duration = Duration::from_millis(2);
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Collects every event the session delivers.
pub fn record_events(session: &mut EngineSession) -> Rc<RefCell<Vec<SessionEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::Ready,
        EventKind::BestMove,
        EventKind::Evaluation,
        EventKind::RawLine,
        EventKind::Error,
    ] {
        let sink = Rc::clone(&events);
        session.subscribe(kind, move |event| sink.borrow_mut().push(event.clone()));
    }
    events
}

/// Drive the host loop until `done` holds.
pub fn poll_until(session: &mut EngineSession, done: impl Fn(&EngineSession) -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !done(session) {
        assert!(Instant::now() < deadline, "engine did not respond in time");
        session.poll();
        thread::sleep(TICK);
    }
}
