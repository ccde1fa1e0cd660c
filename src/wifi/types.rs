//! Radio-level value types shared by the controller and radio backends.

use std::fmt;
use std::net::Ipv4Addr;

/// Which interfaces the radio has enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioMode {
    #[default]
    Off,
    AccessPoint,
    Station,
    AccessPointStation,
}

impl RadioMode {
    pub fn has_access_point(self) -> bool {
        matches!(self, Self::AccessPoint | Self::AccessPointStation)
    }

    pub fn has_station(self) -> bool {
        matches!(self, Self::Station | Self::AccessPointStation)
    }
}

/// Station link status as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    /// Associated and holding an IP address.
    Connected,
    Disconnected,
    NoApFound,
    AuthFailed,
}

/// Security of a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    WapiPsk,
    Unknown,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wep => "wep",
            Self::WpaPsk => "wpa_psk",
            Self::Wpa2Psk => "wpa2_psk",
            Self::WpaWpa2Psk => "wpa_wpa2_psk",
            Self::Wpa2Enterprise => "wpa2_enterprise",
            Self::Wpa3Psk => "wpa3_psk",
            Self::Wpa2Wpa3Psk => "wpa2_wpa3_psk",
            Self::WapiPsk => "wapi_psk",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_secure(self) -> bool {
        self != Self::Open
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Empty for hidden networks.
    pub ssid: String,
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
    pub auth: AuthMode,
}

/// Where the station is (or was) associated.
#[derive(Clone, PartialEq, Eq)]
pub struct Association {
    pub ssid: String,
    pub bssid: Option<[u8; 6]>,
    pub channel: Option<u8>,
    pub ip: Option<Ipv4Addr>,
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("ssid", &self.ssid)
            .field("bssid", &self.bssid.map(format_bssid))
            .field("channel", &self.channel)
            .field("ip", &self.ip)
            .finish()
    }
}

/// Parameters for one connection attempt.
///
/// `bssid`/`channel` pin the attempt to a specific AP, used when rolling back
/// to a previous association.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub ssid: String,
    pub password: String,
    pub bssid: Option<[u8; 6]>,
    pub channel: Option<u8>,
}

impl ConnectTarget {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: None,
            channel: None,
        }
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("ssid", &self.ssid)
            .field("bssid", &self.bssid.map(format_bssid))
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectTarget {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.password);
    }
}

/// `aa:bb:cc:dd:ee:ff`
pub fn format_bssid(bssid: [u8; 6]) -> String {
    bssid
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
