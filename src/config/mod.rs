//! Device configuration types.
//!
//! Everything here is platform-independent and host-testable. Persistence
//! lives in [`crate::store`]; the shared in-memory copy lives in
//! [`crate::session`].
//!
//! # Components
//!
//! - [`device`] - transport mode, UART baud, BLE identity overrides
//! - [`wifi`] - station credentials and their validation

mod device;
mod error;
mod wifi;

pub use device::{
    BaudRate, DeviceConfig, TransportMode, DEFAULT_BAUD_RATE, MAX_BLE_MANUFACTURER_LEN,
    MAX_BLE_NAME_LEN, SUPPORTED_BAUD_RATES,
};
pub use error::ConfigError;
pub use wifi::{WifiCredentials, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};
