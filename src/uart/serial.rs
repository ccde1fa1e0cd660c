//! Serial port abstraction.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// A byte-oriented serial port.
///
/// `read_available` must not block: it returns whatever is already buffered,
/// possibly zero bytes.
pub trait SerialPort: Send {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Re-initialise the peripheral at a new speed.
    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()>;

    /// Drop everything in the receive buffer.
    fn clear_input(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 64];
        while self.read_available(&mut scratch)? > 0 {}
        Ok(())
    }
}

/// Host serial port on stdin/stdout.
///
/// A reader thread forwards stdin chunks over a channel so reads stay
/// non-blocking. Baud changes are only logged.
pub struct StdioSerial {
    input: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    eof: bool,
}

impl StdioSerial {
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; 256];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            })?;
        Ok(Self {
            input: rx,
            pending: Vec::new(),
            eof: false,
        })
    }
}

impl SerialPort for StdioSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() && !self.eof {
            match self.input.try_recv() {
                Ok(chunk) => self.pending = chunk,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    log::info!("[uart] stdin closed");
                    self.eof = true;
                }
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data)?;
        stdout.flush()
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        log::info!("[uart] (host) baud rate set to {}", baud);
        Ok(())
    }
}

/// Scriptable in-memory port for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockSerial {
    state: std::sync::Arc<std::sync::Mutex<MockSerialState>>,
}

#[cfg(test)]
#[derive(Default)]
pub struct MockSerialState {
    pub input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
    pub baud: Option<u32>,
    pub reconfigurations: usize,
}

#[cfg(test)]
impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().unwrap().input.extend(bytes);
    }

    /// Output written so far, split into lines.
    pub fn take_lines(&self) -> Vec<String> {
        let out = std::mem::take(&mut self.state.lock().unwrap().output);
        String::from_utf8_lossy(&out)
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn baud(&self) -> Option<u32> {
        self.state.lock().unwrap().baud
    }

    pub fn reconfigurations(&self) -> usize {
        self.state.lock().unwrap().reconfigurations
    }

    pub fn pending_input(&self) -> usize {
        self.state.lock().unwrap().input.len()
    }
}

#[cfg(test)]
impl SerialPort for MockSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = state.input.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.input.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.state.lock().unwrap().output.extend_from_slice(data);
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.baud = Some(baud);
        state.reconfigurations += 1;
        Ok(())
    }
}
