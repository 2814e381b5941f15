//! Background thread that turns engine output into queued events.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::dispatch::DispatchQueue;
use crate::protocol::{parse, ProtocolEvent};
use crate::sync::{join_with_timeout, RunFlag};
use crate::transport::LineReader;

use super::Inbound;

pub(crate) struct ReaderHandle {
    running: RunFlag,
    handle: JoinHandle<()>,
}

impl ReaderHandle {
    /// Start reading on a dedicated thread.
    pub(crate) fn spawn(
        reader: LineReader,
        queue: DispatchQueue<Inbound>,
        idle_poll: Duration,
    ) -> io::Result<Self> {
        let running = RunFlag::new();
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || read_loop(reader, &queue, &flag, idle_poll))?;
        Ok(ReaderHandle { running, handle })
    }

    /// Ask the loop to stop after its current read.
    pub(crate) fn halt(&self) {
        self.running.halt();
    }

    /// Wait up to `timeout` for the thread to exit; a thread still blocked
    /// after that is detached.
    pub(crate) fn join(self, timeout: Duration) {
        self.running.halt();
        if join_with_timeout(self.handle, timeout).is_err() {
            log::warn!("engine reader did not stop within {timeout:?}, detaching it");
        }
    }
}

/// Parse and enqueue lines until halted or the stream fails.
///
/// Nothing but the queue is touched here; all state changes happen when the
/// host drains it.
fn read_loop(
    mut reader: LineReader,
    queue: &DispatchQueue<Inbound>,
    running: &RunFlag,
    idle_poll: Duration,
) {
    log::debug!("engine reader started");
    while running.is_running() {
        let started = Instant::now();
        match reader.read_line() {
            // Output read after a halt belongs to a session that is going away.
            Ok(Some(_)) if !running.is_running() => break,
            Ok(Some(line)) => {
                log::trace!("<- {line}");
                queue.enqueue(Inbound::Protocol(parse(&line)));
            }
            Ok(None) => thread::sleep(idle_backoff(started.elapsed(), idle_poll)),
            Err(e) => {
                // Expected once shutdown has begun.
                if running.is_running() {
                    log::warn!("engine stream failed: {e}");
                    queue.enqueue(Inbound::Protocol(ProtocolEvent::TransportError {
                        message: e.to_string(),
                    }));
                }
                break;
            }
        }
    }
    log::debug!("engine reader stopped");
}

/// Sleep still owed after an empty read that already blocked for `waited`.
///
/// Socket reads time out after `idle_poll`, so they owe nothing more; reads
/// that return early make up the difference.
fn idle_backoff(waited: Duration, idle_poll: Duration) -> Duration {
    idle_poll.saturating_sub(waited)
}
