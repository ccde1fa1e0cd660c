//! UART command producer.

use super::{LineAssembler, LineEvent, SerialPort};
use crate::command::{CommandSender, Origin};
use crate::config::BaudRate;
use crate::outbound::EventQueue;
use crate::status;
use log::{debug, info, warn};
use std::io;

/// Bytes read from the port per poll.
const READ_CHUNK: usize = 128;

const INPUT_TOO_LONG: &str = "Input too long";

/// Upper bound on bytes consumed per poll, so one poll stays short.
const MAX_BYTES_PER_POLL: usize = 1024;

/// Line-oriented producer feeding the command channel from a serial port.
///
/// While disabled (another transport is active) incoming bytes are read and
/// thrown away, so nothing stale is left behind for the next session.
pub struct UartTransport {
    port: Box<dyn SerialPort>,
    assembler: LineAssembler,
    commands: CommandSender,
    enabled: bool,
    baud: BaudRate,
}

impl UartTransport {
    pub fn new(port: Box<dyn SerialPort>, commands: CommandSender, baud: BaudRate) -> Self {
        Self {
            port,
            assembler: LineAssembler::default(),
            commands,
            enabled: false,
            baud,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }

    /// Start producing. Bytes received while disabled are discarded first.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.discard_input();
        self.enabled = true;
        info!("[uart] enabled at {} baud", self.baud);
    }

    /// Stop producing; any partial line is dropped.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.discard_input();
        info!("[uart] disabled");
    }

    fn discard_input(&mut self) {
        if self.assembler.pending() > 0 {
            debug!("[uart] discarding {} buffered bytes", self.assembler.pending());
        }
        self.assembler.discard();
        if let Err(e) = self.port.clear_input() {
            warn!("[uart] failed to clear input: {}", e);
        }
    }

    /// Re-initialise the peripheral at `baud`.
    ///
    /// Bytes received at the old speed are garbage at the new one, so the
    /// partial line and receive buffer are discarded.
    pub fn set_baud(&mut self, baud: BaudRate) -> io::Result<()> {
        self.port.set_baud_rate(baud.get())?;
        self.baud = baud;
        self.discard_input();
        info!("[uart] baud rate changed to {}", baud);
        Ok(())
    }

    /// Read what is available and enqueue completed lines.
    ///
    /// Returns the number of commands enqueued.
    pub fn poll(&mut self) -> usize {
        let mut buf = [0u8; READ_CHUNK];
        let mut consumed = 0;
        let mut enqueued = 0;

        while consumed < MAX_BYTES_PER_POLL {
            let n = match self.port.read_available(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("[uart] read failed: {}", e);
                    break;
                }
            };
            consumed += n;

            if !self.enabled {
                continue;
            }
            for event in self.assembler.extend(&buf[..n]) {
                match event {
                    LineEvent::Line(line) => {
                        if self.submit(&line) {
                            enqueued += 1;
                        }
                    }
                    LineEvent::TooLong => {
                        warn!("[uart] input too long, buffer reset");
                        self.write_line(&status::error(INPUT_TOO_LONG));
                    }
                }
            }
        }
        enqueued
    }

    fn submit(&mut self, line: &str) -> bool {
        match self.commands.submit(Origin::Uart, line) {
            Ok(()) => true,
            Err(e) => {
                warn!("[uart] dropping command: {}", e);
                self.write_line(&status::error(&e.to_string()));
                false
            }
        }
    }

    /// Write one newline-terminated message.
    pub fn write_line(&mut self, text: &str) {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        if let Err(e) = self.port.write_all(&line) {
            warn!("[uart] write failed: {}", e);
        }
    }

    /// Write every queued outbound line.
    pub fn flush_outgoing(&mut self, queue: &EventQueue) -> usize {
        let mut written = 0;
        while let Some(text) = queue.try_pop() {
            self.write_line(&text);
            written += 1;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_channel, CommandReceiver, MAX_COMMAND_LEN};
    use crate::uart::MockSerial;

    fn transport(capacity: usize) -> (UartTransport, MockSerial, CommandReceiver) {
        let serial = MockSerial::new();
        let (tx, rx) = command_channel(capacity);
        let mut uart = UartTransport::new(Box::new(serial.clone()), tx, BaudRate::default());
        uart.enable();
        (uart, serial, rx)
    }

    fn error_message(line: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["status"], "error");
        value["message"].as_str().unwrap().to_string()
    }

    // ==================== Ingestion Tests ====================

    #[test]
    fn test_line_enqueued_with_uart_origin() {
        let (mut uart, serial, rx) = transport(8);
        serial.feed(b"{\"device\":\"keyboard\"}\r\n");
        assert_eq!(uart.poll(), 1);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.as_str(), "{\"device\":\"keyboard\"}");
        assert_eq!(msg.origin(), Origin::Uart);
        assert!(serial.take_lines().is_empty());
    }

    #[test]
    fn test_overlong_line_reports_error_then_recovers() {
        let (mut uart, serial, rx) = transport(8);
        serial.feed(&vec![b'x'; MAX_COMMAND_LEN + 1]);
        assert_eq!(uart.poll(), 0);
        assert_eq!(error_message(&serial.take_lines()[0]), "Input too long");

        serial.feed(b"{\"device\":\"mouse\"}\n");
        assert_eq!(uart.poll(), 1);
        assert_eq!(rx.try_recv().unwrap().as_str(), "{\"device\":\"mouse\"}");
    }

    #[test]
    fn test_queue_full_reports_error_and_drops() {
        let (mut uart, serial, rx) = transport(1);
        serial.feed(b"first\nsecond\n");
        assert_eq!(uart.poll(), 1);

        let lines = serial.take_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(error_message(&lines[0]), "Command queue full");

        assert_eq!(rx.try_recv().unwrap().as_str(), "first");
        assert!(rx.try_recv().is_none());
    }

    // ==================== Enable / Disable Tests ====================

    #[test]
    fn test_disabled_drains_and_discards() {
        let (mut uart, serial, rx) = transport(8);
        uart.disable();
        serial.feed(b"ignored\n");
        assert_eq!(uart.poll(), 0);
        assert_eq!(serial.pending_input(), 0);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_partial_line_not_carried_across_disable() {
        let (mut uart, serial, rx) = transport(8);
        serial.feed(b"{\"device\":\"keyb");
        uart.poll();

        uart.disable();
        uart.enable();
        serial.feed(b"oard\"}\n");
        uart.poll();

        // Only the fragment after re-enable arrives, never a merged line
        assert_eq!(rx.try_recv().unwrap().as_str(), "oard\"}");
    }

    // ==================== Baud Tests ====================

    #[test]
    fn test_set_baud_reconfigures_and_discards_partial() {
        let (mut uart, serial, rx) = transport(8);
        serial.feed(b"half");
        uart.poll();

        uart.set_baud(BaudRate::new(9600).unwrap()).unwrap();
        assert_eq!(serial.baud(), Some(9600));
        assert_eq!(uart.baud().get(), 9600);
        assert!(uart.is_enabled());

        serial.feed(b"whole\n");
        uart.poll();
        assert_eq!(rx.try_recv().unwrap().as_str(), "whole");
    }

    #[test]
    fn test_flush_outgoing_writes_lines() {
        let (mut uart, serial, _rx) = transport(8);
        let queue = EventQueue::new("uart", 4);
        queue.push(status::ok());
        queue.push(status::event("ready"));
        assert_eq!(uart.flush_outgoing(&queue), 2);
        assert_eq!(serial.take_lines(), vec![status::ok(), status::event("ready")]);
    }
}
