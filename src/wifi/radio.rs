//! The WiFi radio hardware seam.

use super::{ApSettings, Association, ConnectTarget, LinkStatus, RadioMode, ScanEntry};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Driver not initialised or not started.
    NotReady,
    /// SSID or password does not fit the driver's buffers.
    InvalidCredentials,
    /// Scan could not be performed.
    ScanFailed(String),
    /// Any other driver failure.
    Driver(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "WiFi interface not ready"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::ScanFailed(msg) => write!(f, "scan failed: {}", msg),
            Self::Driver(msg) => write!(f, "driver error: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for RadioError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Driver(format!("{:?}", e))
    }
}

/// Minimal driver surface the station controller needs.
///
/// Connection is split into a non-blocking [`begin_connect`](Self::begin_connect)
/// and status polling so the controller owns the timeout. Driver disconnect
/// reasons are delivered separately through
/// [`WifiEventFlags`](super::WifiEventFlags).
pub trait WifiRadio: Send {
    fn mode(&self) -> RadioMode;

    /// Switch interfaces, starting the driver if needed.
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;

    /// Bring up the soft-AP. Returns the AP's IP address.
    fn start_access_point(&mut self, settings: &ApSettings) -> Result<Ipv4Addr, RadioError>;

    fn stop_access_point(&mut self) -> Result<(), RadioError>;

    /// Start associating with `target`; returns immediately.
    fn begin_connect(&mut self, target: &ConnectTarget) -> Result<(), RadioError>;

    fn link_status(&mut self) -> LinkStatus;

    fn disconnect(&mut self) -> Result<(), RadioError>;

    /// Current station association, if connected.
    fn association(&self) -> Option<Association>;

    /// Blocking scan.
    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError>;

    /// Factory MAC, used to derive the AP SSID.
    fn mac_address(&self) -> [u8; 6];
}
