//! ESP32 UART driver adapter.

use super::SerialPort;
use crate::config::BaudRate;
use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config, Uart, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_sys::EspError;
use std::io;

fn to_io(e: EspError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{:?}", e))
}

/// [`SerialPort`] backed by an esp-idf-hal [`UartDriver`].
pub struct EspSerialPort {
    driver: UartDriver<'static>,
}

impl EspSerialPort {
    /// Install the UART driver on `uart` with the given pins, no flow control.
    pub fn new<U: Uart>(
        uart: impl Peripheral<P = U> + 'static,
        tx: impl Peripheral<P = impl OutputPin> + 'static,
        rx: impl Peripheral<P = impl InputPin> + 'static,
        baud: BaudRate,
    ) -> Result<Self, EspError> {
        let config = Config::default().baudrate(Hertz(baud.get()));
        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        Ok(Self { driver })
    }
}

impl SerialPort for EspSerialPort {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.driver.read(buf, NON_BLOCK).map_err(to_io)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            written += self.driver.write(&data[written..]).map_err(to_io)?;
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        self.driver
            .change_baudrate(Hertz(baud))
            .map(|_| ())
            .map_err(to_io)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.driver.clear_rx().map_err(to_io)
    }
}
