//! WiFi station/access-point management.
//!
//! # Components
//!
//! - [`WifiStationController`] - the connection state machine
//! - [`WifiHandle`] - cross-task requests (connect, forget, scan, status)
//! - [`WifiRadio`] - hardware seam, implemented by `EspWifiRadio` on ESP32
//!   and [`SimulatedRadio`] on the host
//! - [`WifiEventFlags`] - latch between driver callbacks and the controller
//!
//! Credential validation lives in [`crate::config`]; persistence in
//! [`crate::store`].

mod backoff;
mod controller;
mod error;
mod events;
mod handle;
mod radio;
mod scan;
mod settings;
mod sim;
mod state;
mod types;

#[cfg(feature = "esp32")]
mod esp;

pub use backoff::Backoff;
pub use controller::WifiStationController;
pub use error::{ConnectOutcome, FailureReason, WifiError};
pub use events::{reason, DisconnectKind, WifiEventFlags, WifiEvents};
pub use handle::{wifi_channel, WifiHandle, WifiRequests, SCAN_REPLY_TIMEOUT};
pub use radio::{RadioError, WifiRadio};
pub use scan::{summarize, NetworkInfo, MAX_SCAN_RESULTS};
pub use settings::{
    ApSettings, SettingsError, WifiTimings, AP_SSID_PREFIX, DEFAULT_AP_IP, DEFAULT_AP_PASSWORD,
};
pub use sim::{SimNetwork, SimulatedRadio};
pub use state::{
    PublishedState, SharedWifiStatus, WifiConnectionState, WifiPhase, WifiStatePublisher,
    WifiStatus,
};
pub use types::{format_bssid, Association, AuthMode, ConnectTarget, LinkStatus, RadioMode, ScanEntry};

#[cfg(feature = "esp32")]
pub use esp::EspWifiRadio;
