//! Splitting a byte stream into protocol lines.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

use crate::error::TransportError;

const CHUNK_SIZE: usize = 4096;

/// Reads engine output and yields it one line at a time.
///
/// A single read may carry several lines (or part of one); complete lines are
/// buffered and handed out in arrival order. Line endings (`\n` or `\r\n`)
/// are stripped and blank lines skipped.
pub struct LineReader {
    source: Box<dyn Read + Send>,
    partial: Vec<u8>,
    lines: VecDeque<String>,
    finished: bool,
}

impl LineReader {
    /// Wrap the engine's output stream.
    pub fn new(source: impl Read + Send + 'static) -> Self {
        LineReader {
            source: Box::new(source),
            partial: Vec::new(),
            lines: VecDeque::new(),
            finished: false,
        }
    }

    /// Next complete line.
    ///
    /// Blocks on the underlying stream. `Ok(None)` means the stream had no
    /// data yet (a read timeout fired) and the caller should poll again
    /// later. Once the stream closes, any buffered lines are still returned
    /// before [`TransportError::EndOfStream`].
    pub fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Ok(Some(line));
            }
            if self.finished {
                return Err(TransportError::EndOfStream);
            }

            let mut chunk = [0u8; CHUNK_SIZE];
            match self.source.read(&mut chunk) {
                Ok(0) => {
                    self.finished = true;
                    let rest = std::mem::take(&mut self.partial);
                    self.push_line(&rest);
                }
                Ok(n) => self.split_chunk(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::Read(Arc::new(e))),
            }
        }
    }

    fn split_chunk(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.push_line(&line);
            } else {
                self.partial.push(byte);
            }
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\r');
        if !text.trim().is_empty() {
            self.lines.push_back(text.to_string());
        }
    }
}
