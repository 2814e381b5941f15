use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{LineReader, Transport};
use crate::error::TransportError;

/// How long a closing engine gets to exit on its own before it is killed
const EXIT_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL_MS: u64 = 5;

/// Hide the console window of the engine on Windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// An engine running as a child process, spoken to over its stdin/stdout.
pub struct ProcessTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<LineReader>,
    closed: bool,
}

impl ProcessTransport {
    /// Spawn `program` directly with piped stdin and stdout.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self, TransportError> {
        let launch_error = |source| TransportError::Launch {
            target: program.display().to_string(),
            source: Arc::new(source),
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(launch_error)?;
        let stdin = child.stdin.take();
        let reader = child.stdout.take().map(LineReader::new);
        log::info!("spawned engine {} (pid {})", program.display(), child.id());

        Ok(ProcessTransport {
            child,
            stdin,
            reader,
            closed: false,
        })
    }

    /// Wait up to `grace` for the child to exit by itself.
    fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("engine exited with {status}");
                    return true;
                }
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(EXIT_POLL_MS));
                }
                Ok(None) => return false,
                Err(e) => {
                    log::warn!("failed to query engine process: {e}");
                    return false;
                }
            }
        }
    }
}

impl Transport for ProcessTransport {
    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        writeln!(stdin, "{text}")
            .and_then(|()| stdin.flush())
            .map_err(|source| TransportError::Write {
                command: text.to_string(),
                source: Arc::new(source),
            })
    }

    fn take_reader(&mut self) -> Option<LineReader> {
        self.reader.take()
    }

    /// Closing stdin lets the engine see end of input and exit; it is only
    /// killed if it is still alive after a short grace period.
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.stdin.take());

        if !self.wait_for_exit(EXIT_GRACE) {
            log::warn!("engine did not exit, killing pid {}", self.child.id());
            if let Err(e) = self.child.kill() {
                log::warn!("failed to kill engine: {e}");
            }
            let _ = self.child.wait();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.close();
    }
}
