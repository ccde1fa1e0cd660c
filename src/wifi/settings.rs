//! WiFi timing and access-point settings.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default soft-AP password.
pub const DEFAULT_AP_PASSWORD: &str = "uhid1234";

/// Default soft-AP address; the captive portal lives here.
pub const DEFAULT_AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Prefix of the generated AP SSID.
pub const AP_SSID_PREFIX: &str = "ble-hid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    InvalidConfig(&'static str),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid WiFi settings: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Timeouts and backoff parameters for the station controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiTimings {
    /// Upper bound on one connection attempt.
    pub connect_timeout: Duration,
    /// Status poll period inside a connection attempt.
    pub poll_interval: Duration,
    /// How long the AP stays up after the station connects.
    pub ap_grace: Duration,
    /// Bound on re-associating to the previous network after a failed switch.
    pub rollback_timeout: Duration,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Reconnect delay ceiling.
    pub backoff_cap: Duration,
    /// Random spread applied to each delay, in percent.
    pub jitter_percent: u8,
    /// Delay before bringing the access point up again after it failed to start.
    pub ap_retry_interval: Duration,
}

impl Default for WifiTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            ap_grace: Duration::from_secs(3),
            rollback_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(300),
            jitter_percent: 10,
            ap_retry_interval: Duration::from_secs(10),
        }
    }
}

impl WifiTimings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.connect_timeout.is_zero() {
            return Err(SettingsError::InvalidConfig("connect_timeout must be > 0"));
        }
        if self.poll_interval.is_zero() || self.poll_interval > self.connect_timeout {
            return Err(SettingsError::InvalidConfig(
                "poll_interval must be > 0 and <= connect_timeout",
            ));
        }
        if self.rollback_timeout.is_zero() {
            return Err(SettingsError::InvalidConfig("rollback_timeout must be > 0"));
        }
        if self.backoff_base.is_zero() {
            return Err(SettingsError::InvalidConfig("backoff_base must be > 0"));
        }
        if self.backoff_cap < self.backoff_base {
            return Err(SettingsError::InvalidConfig(
                "backoff_cap must be >= backoff_base",
            ));
        }
        if self.ap_retry_interval.is_zero() {
            return Err(SettingsError::InvalidConfig("ap_retry_interval must be > 0"));
        }
        if self.jitter_percent >= 100 {
            return Err(SettingsError::InvalidConfig("jitter_percent must be < 100"));
        }
        Ok(())
    }
}

/// Soft-AP parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct ApSettings {
    pub ssid: String,
    pub password: String,
    pub ip: Ipv4Addr,
    pub channel: u8,
}

impl Default for ApSettings {
    fn default() -> Self {
        Self {
            ssid: AP_SSID_PREFIX.to_string(),
            password: DEFAULT_AP_PASSWORD.to_string(),
            ip: DEFAULT_AP_IP,
            channel: 1,
        }
    }
}

impl ApSettings {
    /// Defaults with an SSID unique to this device, e.g. `ble-hid-3F2A`.
    pub fn for_mac(mac: [u8; 6]) -> Self {
        Self {
            ssid: format!("{}-{:02X}{:02X}", AP_SSID_PREFIX, mac[4], mac[5]),
            ..Default::default()
        }
    }

    /// Root URL of the captive portal page.
    pub fn portal_url(&self) -> String {
        format!("http://{}/", self.ip)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(SettingsError::InvalidConfig("AP SSID must be 1-32 bytes"));
        }
        if !self.password.is_empty() && !(8..=64).contains(&self.password.len()) {
            return Err(SettingsError::InvalidConfig(
                "AP password must be empty or 8-64 bytes",
            ));
        }
        if !(1..=13).contains(&self.channel) {
            return Err(SettingsError::InvalidConfig("AP channel must be 1-13"));
        }
        Ok(())
    }
}

impl fmt::Debug for ApSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApSettings")
            .field("ssid", &self.ssid)
            .field("ip", &self.ip)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
