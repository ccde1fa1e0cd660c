//! BLE HID device.
//!
//! - [`HidBackend`] - the BLE stack seam ([`NimbleHid`] on ESP32,
//!   [`LoggingHid`] on the host)
//! - [`HidDevice`] - keyboard/mouse/consumer report state over a backend
//! - [`BleSessionManager`] - stack lifecycle, identity and connection edges

mod hid;
pub mod keys;
mod session;
mod sim;

#[cfg(feature = "esp32")]
mod nimble;

pub use hid::{
    BleIdentity, HidBackend, HidDevice, HidError, KeyboardReport, Motion, MouseReport,
    KEY_ROLLOVER,
};
pub use session::{BleSessionManager, BleStackState, RESTART_SETTLE};
pub use sim::{HidCall, LoggingHid, SIM_MANUFACTURER};

#[cfg(feature = "esp32")]
pub use nimble::NimbleHid;
