//! UART command transport.
//!
//! - [`LineAssembler`] - byte stream to newline-delimited lines
//! - [`SerialPort`] - hardware seam (`StdioSerial` on host, `EspSerialPort` on ESP32)
//! - [`UartTransport`] - producer into the command channel

#[cfg(feature = "esp32")]
mod esp;
mod line;
mod serial;
mod transport;

#[cfg(feature = "esp32")]
pub use esp::EspSerialPort;
pub use line::{LineAssembler, LineEvent};
#[cfg(test)]
pub use serial::MockSerial;
pub use serial::{SerialPort, StdioSerial};
pub use transport::UartTransport;
