//! Newline-delimited line assembly.

use crate::command::MAX_COMMAND_LEN;

/// Outcome of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete, non-empty line (terminator stripped).
    Line(String),
    /// The line grew past the limit; the buffer was discarded.
    TooLong,
}

/// Accumulates bytes into lines.
///
/// `\r` is ignored, `\n` completes a line. A line longer than the limit
/// reports [`LineEvent::TooLong`] and restarts from an empty buffer.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    max_len: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(MAX_COMMAND_LEN)
    }
}

impl LineAssembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            max_len,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        match byte {
            b'\r' => None,
            b'\n' => {
                if self.buf.is_empty() {
                    return None;
                }
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                Some(LineEvent::Line(line))
            }
            _ if self.buf.len() >= self.max_len => {
                self.buf.clear();
                Some(LineEvent::TooLong)
            }
            _ => {
                self.buf.push(byte);
                None
            }
        }
    }

    /// Feed a chunk, collecting every event it produces.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<LineEvent> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Throw away any partial line.
    pub fn discard(&mut self) {
        self.buf.clear();
    }

    /// Bytes of the partial line buffered so far.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
