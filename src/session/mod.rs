//! Engine session controller.
//!
//! An [`EngineSession`] owns one transport to a UCI engine and drives the
//! handshake and search state machine. Engine output is read on a background
//! thread and queued; the host calls [`EngineSession::poll`] once per tick to
//! apply it and run registered callbacks. Session state is only ever changed
//! on the host thread.
//!
//! ```rust,ignore
//! let mut session = EngineSession::new(SessionOptions::new("stockfish".parse()?));
//! session.stage_config(EngineConfig::new().with_depth(12))?;
//! session.subscribe(EventKind::BestMove, |event| println!("{event:?}"));
//! session.start()?;
//! loop {
//!     session.poll();
//!     // ...
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, SessionOptions};
use crate::dispatch::DispatchQueue;
use crate::error::{SessionError, TransportError};
use crate::protocol::{Position, ProtocolEvent, UciCommand};
use crate::transport::{Connector, SystemConnector, Transport};

mod observers;
mod reader;
mod state;
#[cfg(test)]
mod tests;

pub use observers::{EventKind, SessionEvent, SubscriptionId};
pub use state::SessionState;

use observers::Observers;
use reader::ReaderHandle;

/// Items crossing from background threads to the host.
#[derive(Debug, Clone)]
pub(crate) enum Inbound {
    Protocol(ProtocolEvent),
    Failure(SessionError),
}

/// Controller for one external UCI engine.
pub struct EngineSession {
    options: SessionOptions,
    connector: Box<dyn Connector>,
    state: SessionState,
    /// Configuration sent at the last start
    config: EngineConfig,
    /// Configuration to send at the next start
    pending_config: EngineConfig,
    is_analyzing: bool,
    transport: Option<Box<dyn Transport>>,
    reader: Option<ReaderHandle>,
    queue: DispatchQueue<Inbound>,
    observers: Observers,
    position: Position,
    last_evaluation: Option<f64>,
    engine_name: Option<String>,
}

impl EngineSession {
    /// Create a stopped session that opens real processes or sockets.
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self::with_connector(options, Box::new(SystemConnector))
    }

    /// Create a stopped session that opens transports through `connector`.
    #[must_use]
    pub fn with_connector(options: SessionOptions, connector: Box<dyn Connector>) -> Self {
        EngineSession {
            options,
            connector,
            state: SessionState::Stopped,
            config: EngineConfig::default(),
            pending_config: EngineConfig::default(),
            is_analyzing: false,
            transport: None,
            reader: None,
            queue: DispatchQueue::new(),
            observers: Observers::default(),
            position: Position::startpos(),
            last_evaluation: None,
            engine_name: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport target and reader timing this session was built with.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Settings sent to the engine at the last start.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Settings that the next start will send.
    #[must_use]
    pub fn pending_config(&self) -> &EngineConfig {
        &self.pending_config
    }

    /// Whether a `go` is outstanding.
    #[must_use]
    pub fn is_analyzing(&self) -> bool {
        self.is_analyzing
    }

    /// The position the next search will be run on.
    #[must_use]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Most recent normalized evaluation since the last start.
    #[must_use]
    pub fn last_evaluation(&self) -> Option<f64> {
        self.last_evaluation
    }

    /// Name reported by the engine in its `id name` line.
    #[must_use]
    pub fn engine_name(&self) -> Option<&str> {
        self.engine_name.as_deref()
    }

    /// Register `handler` for one kind of event. Handlers run inside
    /// [`EngineSession::poll`].
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + 'static,
    {
        self.observers.subscribe(kind, Box::new(handler))
    }

    /// Remove a handler. Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Store settings to be sent at the next `start`.
    ///
    /// Allowed while stopped or faulted; during the handshake this behaves
    /// like [`EngineSession::apply_config`]. Once the engine is ready the
    /// request is rejected.
    pub fn stage_config(&mut self, config: EngineConfig) -> Result<(), SessionError> {
        match self.state {
            SessionState::Stopped | SessionState::Faulted => {
                self.pending_config = config;
                Ok(())
            }
            SessionState::AwaitingHandshake => self.apply_config(config),
            state => Err(self.fail(SessionError::NotReadyForReconfiguration { state })),
        }
    }

    /// Send settings to an engine whose handshake is still in progress.
    ///
    /// Any other state leaves the configuration untouched and queues a
    /// [`SessionError::NotReadyForReconfiguration`] notification.
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingHandshake {
            let state = self.state;
            return Err(self.fail(SessionError::NotReadyForReconfiguration { state }));
        }
        self.pending_config = config;
        self.config = config;
        for command in config.setoption_commands() {
            self.send(&command);
        }
        Ok(())
    }

    /// Open the transport and begin the handshake.
    ///
    /// Sends `uci`, the staged options, `ucinewgame` and `isready`. The
    /// session is ready once the engine answers `readyok`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if !self.state.can_start() {
            let state = self.state;
            return Err(self.fail(SessionError::InvalidState {
                operation: "start",
                state,
            }));
        }

        // Leftovers from a faulted run.
        self.release();
        self.is_analyzing = false;
        self.last_evaluation = None;
        self.engine_name = None;

        self.state = SessionState::Starting;
        log::info!("starting engine session for {}", self.options.target);

        let mut transport = match self.connector.open(
            &self.options.target,
            self.options.idle_poll,
            self.options.connect_timeout,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = SessionState::Faulted;
                return Err(self.fail(e.into()));
            }
        };

        let Some(line_reader) = transport.take_reader() else {
            transport.close();
            self.state = SessionState::Faulted;
            return Err(self.fail(TransportError::Closed.into()));
        };
        let spawned = ReaderHandle::spawn(line_reader, self.queue.clone(), self.options.idle_poll);
        let reader = match spawned {
            Ok(reader) => reader,
            Err(e) => {
                transport.close();
                self.state = SessionState::Faulted;
                let err = TransportError::Launch {
                    target: self.options.target.to_string(),
                    source: Arc::new(e),
                };
                return Err(self.fail(err.into()));
            }
        };
        self.reader = Some(reader);
        self.transport = Some(transport);

        self.config = self.pending_config;
        self.send(&UciCommand::Uci);
        for command in self.config.setoption_commands() {
            self.send(&command);
        }
        self.send(&UciCommand::UciNewGame);
        self.send(&UciCommand::IsReady);

        self.state = SessionState::AwaitingHandshake;
        Ok(())
    }

    /// Remember `position` and send it to the engine.
    pub fn set_position(&mut self, position: Position) -> Result<(), SessionError> {
        self.require_commands("set position")?;
        self.position = position;
        let command = UciCommand::Position(self.position.clone());
        self.send(&command);
        Ok(())
    }

    /// Search the current position to the configured depth.
    ///
    /// A search already running is stopped first. Its `bestmove` may still
    /// arrive and is reported like any other.
    pub fn find_best_move(&mut self) -> Result<(), SessionError> {
        self.require_commands("find best move")?;
        if self.is_analyzing {
            self.send(&UciCommand::Stop);
        }
        let depth = self.config.depth();
        self.begin_search(UciCommand::GoDepth(depth));
        Ok(())
    }

    /// Search the current position until [`EngineSession::stop`].
    pub fn find_best_move_infinite(&mut self) -> Result<(), SessionError> {
        self.require_commands("find best move")?;
        if self.is_analyzing {
            return Err(self.fail(SessionError::AlreadyAnalyzing));
        }
        self.begin_search(UciCommand::GoInfinite);
        Ok(())
    }

    /// Stop the running search without waiting for the engine to confirm.
    ///
    /// Does nothing when no search is running.
    pub fn stop(&mut self) {
        if !self.is_analyzing {
            return;
        }
        self.send(&UciCommand::Stop);
        self.is_analyzing = false;
        if self.state == SessionState::Analyzing {
            self.state = SessionState::Ready;
        }
    }

    /// Stop the reader, close the transport and return to `Stopped`.
    ///
    /// Calling this on a stopped session does nothing.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        log::info!("shutting down engine session ({})", self.state);
        self.release();
        self.is_analyzing = false;
        self.state = SessionState::Stopped;
    }

    /// Apply queued engine output and failures, running callbacks.
    ///
    /// Call once per host tick. Returns the number of events handled.
    pub fn poll(&mut self) -> usize {
        let queue = self.queue.clone();
        queue.drain_with(|item| self.handle(item))
    }

    fn handle(&mut self, item: Inbound) {
        let event = match item {
            Inbound::Failure(err) => SessionEvent::Error(err),
            // A reader detached after a join timeout may still be queueing.
            Inbound::Protocol(event) if self.state == SessionState::Stopped => {
                log::trace!("ignoring {event:?} from a stopped engine");
                return;
            }
            Inbound::Protocol(ProtocolEvent::EngineReady) => {
                if self.state != SessionState::AwaitingHandshake {
                    log::debug!("ignoring readyok while {}", self.state);
                    return;
                }
                log::info!("engine ready");
                self.state = SessionState::Ready;
                SessionEvent::Ready
            }
            Inbound::Protocol(ProtocolEvent::BestMove { mv, ponder }) => {
                log::debug!("best move {mv}");
                self.is_analyzing = false;
                if self.state == SessionState::Analyzing {
                    self.state = SessionState::Ready;
                }
                SessionEvent::BestMove { mv, ponder }
            }
            Inbound::Protocol(ProtocolEvent::Evaluation { normalized_score }) => {
                self.last_evaluation = Some(normalized_score);
                SessionEvent::Evaluation(normalized_score)
            }
            Inbound::Protocol(ProtocolEvent::RawLine { text }) => {
                if let Some(name) = text.strip_prefix("id name ") {
                    self.engine_name = Some(name.trim().to_string());
                }
                SessionEvent::RawLine(text)
            }
            Inbound::Protocol(ProtocolEvent::TransportError { message }) => {
                log::warn!("engine connection lost: {message}");
                self.state = SessionState::Faulted;
                self.is_analyzing = false;
                SessionEvent::Error(SessionError::Disconnected { message })
            }
        };
        self.observers.notify(&event);
    }

    fn require_commands(&mut self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.accepts_commands() {
            return Ok(());
        }
        log::debug!("rejecting {operation} while {}", self.state);
        let state = self.state;
        Err(self.fail(SessionError::NotReady { state }))
    }

    fn begin_search(&mut self, go: UciCommand) {
        let position = UciCommand::Position(self.position.clone());
        self.send(&position);
        self.send(&go);
        self.is_analyzing = true;
        self.state = SessionState::Analyzing;
    }

    /// Queue `err` for the host and hand it back to the caller.
    fn fail(&self, err: SessionError) -> SessionError {
        log::debug!("session error: {err}");
        self.queue.enqueue(Inbound::Failure(err.clone()));
        err
    }

    /// Write one command. Write failures are logged and dropped.
    fn send(&mut self, command: &UciCommand) {
        let Some(transport) = self.transport.as_mut() else {
            log::warn!("dropping '{command}': no transport");
            return;
        };
        let line = command.to_string();
        log::debug!("-> {line}");
        if let Err(e) = transport.write_line(&line) {
            log::warn!("{e}");
        }
    }

    /// Halt the reader, ask the engine to quit, join the reader with a
    /// bounded wait, then close the transport.
    fn release(&mut self) {
        if let Some(reader) = &self.reader {
            reader.halt();
        }
        if let Some(transport) = self.transport.as_mut() {
            if !transport.is_closed() {
                let quit = UciCommand::Quit.to_string();
                if let Err(e) = transport.write_line(&quit) {
                    log::debug!("could not send quit: {e}");
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.join(self.shutdown_timeout());
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        // Engine output nobody asked for any more. Failures still get reported.
        let dropped = self.queue.retain(|item| matches!(item, Inbound::Failure(_)));
        if dropped > 0 {
            log::debug!("discarded {dropped} engine lines left at shutdown");
        }
    }

    fn shutdown_timeout(&self) -> Duration {
        self.options.shutdown_timeout
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
