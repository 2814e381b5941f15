//! State-machine tests against an in-memory engine.
//!
//! The scripted transport records every command line and feeds engine output
//! through a channel, so the real reader thread and dispatch path are used.

use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::*;
use crate::config::SessionOptions;
use crate::transport::{LineReader, TransportTarget};

const IDLE_POLL: Duration = Duration::from_millis(1);
const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Engine output arriving over a channel; a dropped sender is end of stream.
struct ChannelRead {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(IDLE_POLL) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "idle"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    fail_writes: Arc<Mutex<bool>>,
    reader: Option<LineReader>,
    closed: bool,
}

impl Transport for ScriptedTransport {
    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if *self.fail_writes.lock() {
            return Err(TransportError::Write {
                command: text.to_string(),
                source: Arc::new(io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin closed")),
            });
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn take_reader(&mut self) -> Option<LineReader> {
        self.reader.take()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Clone, Default)]
struct ScriptedConnector {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    engine: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    refuse: Arc<Mutex<bool>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl Connector for ScriptedConnector {
    fn open(
        &self,
        target: &TransportTarget,
        _read_timeout: Duration,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if *self.refuse.lock() {
            return Err(TransportError::Launch {
                target: target.to_string(),
                source: Arc::new(io::Error::new(io::ErrorKind::NotFound, "no such engine")),
            });
        }
        let (tx, rx) = mpsc::channel();
        *self.engine.lock() = Some(tx);
        Ok(Box::new(ScriptedTransport {
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            fail_writes: Arc::clone(&self.fail_writes),
            reader: Some(LineReader::new(ChannelRead {
                rx,
                pending: Vec::new(),
            })),
            closed: false,
        }))
    }
}

struct Harness {
    session: EngineSession,
    connector: ScriptedConnector,
    events: Rc<RefCell<Vec<SessionEvent>>>,
}

impl Harness {
    fn new() -> Self {
        let connector = ScriptedConnector::default();
        let options = SessionOptions::new(TransportTarget::process("scripted-engine"))
            .with_idle_poll(IDLE_POLL)
            .with_shutdown_timeout(Duration::from_millis(500));
        let mut session = EngineSession::with_connector(options, Box::new(connector.clone()));

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

        Harness {
            session,
            connector,
            events,
        }
    }

    /// Engine writes `text` (may hold several lines).
    fn emit(&self, text: &str) {
        let engine = self.connector.engine.lock();
        let tx = engine.as_ref().expect("engine not started");
        tx.send(text.as_bytes().to_vec()).unwrap();
    }

    /// Engine closes its output.
    fn hang_up(&self) {
        self.connector.engine.lock().take();
    }

    fn sent(&self) -> Vec<String> {
        self.connector.sent.lock().clone()
    }

    fn clear_sent(&self) {
        self.connector.sent.lock().clear();
    }

    fn closes(&self) -> usize {
        self.connector.closes.load(Ordering::SeqCst)
    }

    /// Poll until `done` holds or the wait limit passes.
    fn poll_until(&mut self, done: impl Fn(&Harness) -> bool) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while !done(self) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            self.session.poll();
            thread::sleep(IDLE_POLL);
        }
    }

    fn ready(&mut self) {
        self.session.start().unwrap();
        self.emit("readyok\n");
        self.poll_until(|h| h.session.state() == SessionState::Ready);
        self.clear_sent();
        self.events.borrow_mut().clear();
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind() == kind).count()
    }

    fn errors(&self) -> Vec<SessionError> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn test_start_sends_handshake_with_staged_config() {
    let mut h = Harness::new();
    let config = EngineConfig::new().with_depth(15).with_elo_rating(1320);
    h.session.stage_config(config).unwrap();
    h.session.start().unwrap();

    assert_eq!(h.session.state(), SessionState::AwaitingHandshake);
    assert_eq!(
        h.sent(),
        vec!["uci", "setoption name UCI_Elo value 1320", "ucinewgame", "isready"]
    );
    assert_eq!(h.session.config().depth(), 15);
}

#[test]
fn test_out_of_range_config_is_clamped_before_sending() {
    let mut h = Harness::new();
    h.session
        .stage_config(EngineConfig::new().with_elo_rating(9000).with_depth(-4))
        .unwrap();
    h.session.start().unwrap();
    assert!(h.sent().contains(&"setoption name UCI_Elo value 3190".to_string()));
    assert_eq!(h.session.config().depth(), 1);
}

#[test]
fn test_first_readyok_completes_handshake_once() {
    let mut h = Harness::new();
    h.session.start().unwrap();
    h.emit("id name Scripted 1.0\nuciok\nreadyok\n");
    h.poll_until(|h| h.session.state() == SessionState::Ready);
    assert_eq!(h.count(EventKind::Ready), 1);
    assert_eq!(h.session.engine_name(), Some("Scripted 1.0"));

    h.emit("readyok\ninfo string marker\n");
    h.poll_until(|h| h.count(EventKind::RawLine) == 3);
    assert_eq!(h.count(EventKind::Ready), 1);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn test_apply_config_during_handshake() {
    let mut h = Harness::new();
    h.session.start().unwrap();
    h.clear_sent();

    let config = EngineConfig::new().with_threads(2).with_elo_rating(2000);
    h.session.apply_config(config).unwrap();
    assert_eq!(
        h.sent(),
        vec!["setoption name Threads value 2", "setoption name UCI_Elo value 2000"]
    );
    assert_eq!(h.session.config().thread_count(), 2);
}

#[test]
fn test_reconfiguration_rejected_after_ready() {
    let mut h = Harness::new();
    h.ready();

    let result = h.session.apply_config(EngineConfig::new().with_elo_rating(1500));
    assert!(matches!(
        result,
        Err(SessionError::NotReadyForReconfiguration {
            state: SessionState::Ready
        })
    ));
    assert!(h.session.stage_config(EngineConfig::new()).is_err());
    assert!(h.sent().is_empty());
    assert_eq!(h.session.config().elo_rating(), crate::config::MAX_ELO);

    h.session.poll();
    assert_eq!(h.errors().len(), 2);
}

#[test]
fn test_apply_config_while_stopped_is_rejected() {
    let mut h = Harness::new();
    assert!(h.session.apply_config(EngineConfig::new()).is_err());
    h.session.poll();
    assert_eq!(h.count(EventKind::Error), 1);
}

#[test]
fn test_search_before_ready_is_an_error() {
    let mut h = Harness::new();
    h.session.start().unwrap();
    h.clear_sent();

    assert!(matches!(
        h.session.find_best_move(),
        Err(SessionError::NotReady {
            state: SessionState::AwaitingHandshake
        })
    ));
    assert!(h.session.set_position(Position::startpos()).is_err());
    assert!(h.sent().is_empty());

    h.session.poll();
    assert_eq!(h.count(EventKind::Error), 2);
}

#[test]
fn test_find_best_move_sends_position_and_depth() {
    let mut h = Harness::new();
    h.session
        .stage_config(EngineConfig::new().with_depth(8))
        .unwrap();
    h.ready();

    let position = Position::startpos().with_moves(["e2e4", "e7e5"]);
    h.session.set_position(position.clone()).unwrap();
    h.session.find_best_move().unwrap();

    assert_eq!(h.session.state(), SessionState::Analyzing);
    assert!(h.session.is_analyzing());
    assert_eq!(h.session.position(), &position);
    assert_eq!(
        h.sent(),
        vec![
            "position startpos moves e2e4 e7e5",
            "position startpos moves e2e4 e7e5",
            "go depth 8",
        ]
    );
}

#[test]
fn test_find_best_move_while_analyzing_stops_first() {
    let mut h = Harness::new();
    h.ready();
    h.session.find_best_move().unwrap();
    h.clear_sent();

    h.session.find_best_move().unwrap();
    let sent = h.sent();
    let stops: Vec<usize> = sent
        .iter()
        .enumerate()
        .filter(|(_, s)| *s == "stop")
        .map(|(i, _)| i)
        .collect();
    let gos: Vec<usize> = sent
        .iter()
        .enumerate()
        .filter(|(_, s)| s.starts_with("go depth"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(stops.len(), 1);
    assert_eq!(gos.len(), 1);
    assert!(stops[0] < gos[0]);
    assert_eq!(h.session.state(), SessionState::Analyzing);
}

#[test]
fn test_bestmove_returns_to_ready() {
    let mut h = Harness::new();
    h.ready();
    h.session.find_best_move().unwrap();

    h.emit("info depth 12 score cp 34 pv e2e4\nbestmove e2e4 ponder e7e5\n");
    h.poll_until(|h| h.count(EventKind::BestMove) == 1);

    assert_eq!(h.session.state(), SessionState::Ready);
    assert!(!h.session.is_analyzing());
    let events = h.events.borrow();
    assert!(matches!(
        &events[..],
        [
            SessionEvent::Evaluation(score),
            SessionEvent::BestMove { mv, ponder },
        ] if (score - 0.517).abs() < 1e-9 && mv == "e2e4" && ponder.as_deref() == Some("e7e5")
    ));
    drop(events);
    assert!((h.session.last_evaluation().unwrap() - 0.517).abs() < 1e-9);
}

#[test]
fn test_infinite_search_and_stop() {
    let mut h = Harness::new();
    h.ready();
    h.session.set_position(Position::fen("8/8/8/8/8/8/k7/K7 w - - 0 1")).unwrap();
    h.clear_sent();

    h.session.find_best_move_infinite().unwrap();
    assert!(matches!(
        h.session.find_best_move_infinite(),
        Err(SessionError::AlreadyAnalyzing)
    ));

    h.session.stop();
    assert!(!h.session.is_analyzing());
    assert_eq!(h.session.state(), SessionState::Ready);
    assert_eq!(
        h.sent(),
        vec![
            "position fen 8/8/8/8/8/8/k7/K7 w - - 0 1",
            "go infinite",
            "stop",
        ]
    );

    h.session.poll();
    assert_eq!(h.count(EventKind::Error), 1);
}

#[test]
fn test_stop_when_idle_is_noop() {
    let mut h = Harness::new();
    h.ready();
    h.session.stop();
    assert!(h.sent().is_empty());
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn test_stale_bestmove_after_stop_is_reported() {
    let mut h = Harness::new();
    h.ready();
    h.session.find_best_move_infinite().unwrap();
    h.session.stop();

    h.emit("bestmove d2d4\n");
    h.poll_until(|h| h.count(EventKind::BestMove) == 1);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn test_engine_output_left_at_shutdown_is_discarded() {
    let mut h = Harness::new();
    h.ready();
    h.session.find_best_move().unwrap();

    h.emit("info depth 9 score cp 300 pv e2e4\nbestmove e2e4\n");
    let deadline = Instant::now() + WAIT_LIMIT;
    while h.session.queue.len() < 2 {
        assert!(Instant::now() < deadline, "reader did not queue engine output");
        thread::sleep(IDLE_POLL);
    }

    h.session.shutdown();
    assert_eq!(h.session.poll(), 0);
    assert_eq!(h.count(EventKind::BestMove), 0);
    assert_eq!(h.count(EventKind::Evaluation), 0);
    assert_eq!(h.session.last_evaluation(), None);
    assert_eq!(h.session.state(), SessionState::Stopped);
}

#[test]
fn test_failures_queued_before_shutdown_are_still_reported() {
    let mut h = Harness::new();
    h.ready();
    assert!(h.session.find_best_move_infinite().is_ok());
    assert!(h.session.find_best_move_infinite().is_err());

    h.session.shutdown();
    assert_eq!(h.session.poll(), 1);
    assert!(matches!(h.errors()[..], [SessionError::AlreadyAnalyzing]));
}

#[test]
fn test_write_failures_are_logged_not_fatal() {
    let mut h = Harness::new();
    h.ready();
    *h.connector.fail_writes.lock() = true;

    assert!(h
        .session
        .set_position(Position::startpos().with_moves(["d2d4"]))
        .is_ok());
    assert_eq!(h.session.state(), SessionState::Ready);
    assert!(h.session.find_best_move().is_ok());
    assert_eq!(h.session.state(), SessionState::Analyzing);
    assert!(h.sent().is_empty());

    assert_eq!(h.session.poll(), 0);
    assert_eq!(h.count(EventKind::Error), 0);
    assert_ne!(h.session.state(), SessionState::Faulted);

    // The engine can still answer; the session keeps working.
    *h.connector.fail_writes.lock() = false;
    h.emit("bestmove d2d4\n");
    h.poll_until(|h| h.count(EventKind::BestMove) == 1);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn test_launch_failure_faults_once_and_allows_retry() {
    let mut h = Harness::new();
    *h.connector.refuse.lock() = true;

    assert!(matches!(
        h.session.start(),
        Err(SessionError::Transport(TransportError::Launch { .. }))
    ));
    assert_eq!(h.session.state(), SessionState::Faulted);
    assert_eq!(h.session.poll(), 1);
    assert_eq!(h.errors().len(), 1);
    assert_eq!(h.session.poll(), 0);

    *h.connector.refuse.lock() = false;
    h.session.start().unwrap();
    assert_eq!(h.session.state(), SessionState::AwaitingHandshake);
    assert_eq!(h.connector.opens.load(Ordering::SeqCst), 2);
}

#[test]
fn test_engine_hang_up_faults_session() {
    let mut h = Harness::new();
    h.ready();
    h.session.find_best_move().unwrap();

    h.hang_up();
    h.poll_until(|h| h.session.state() == SessionState::Faulted);
    assert!(!h.session.is_analyzing());
    let errors = h.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], SessionError::Disconnected { .. }));

    assert!(h.session.find_best_move().is_err());
    h.session.start().unwrap();
    assert_eq!(h.closes(), 1);
}

#[test]
fn test_start_twice_is_invalid() {
    let mut h = Harness::new();
    h.session.start().unwrap();
    assert!(matches!(
        h.session.start(),
        Err(SessionError::InvalidState {
            operation: "start",
            state: SessionState::AwaitingHandshake
        })
    ));
    assert_eq!(h.connector.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut h = Harness::new();
    h.ready();

    h.session.shutdown();
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert_eq!(h.sent(), vec!["quit"]);
    assert_eq!(h.closes(), 1);

    h.session.shutdown();
    assert_eq!(h.closes(), 1);
    assert_eq!(h.sent(), vec!["quit"]);
}

#[test]
fn test_shutdown_on_fresh_session_does_nothing() {
    let mut h = Harness::new();
    h.session.shutdown();
    assert_eq!(h.session.state(), SessionState::Stopped);
    assert_eq!(h.closes(), 0);
}

#[test]
fn test_restart_after_shutdown() {
    let mut h = Harness::new();
    h.ready();
    h.session.shutdown();
    h.clear_sent();

    h.ready();
    assert_eq!(h.session.state(), SessionState::Ready);
    assert_eq!(h.connector.opens.load(Ordering::SeqCst), 2);
}

#[test]
fn test_poll_with_nothing_queued() {
    let mut h = Harness::new();
    assert_eq!(h.session.poll(), 0);
    assert!(h.events.borrow().is_empty());
}

#[test]
fn test_drop_closes_transport() {
    let h = Harness::new();
    let closes = Arc::clone(&h.connector.closes);
    let Harness { mut session, .. } = h;
    session.start().unwrap();
    drop(session);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
