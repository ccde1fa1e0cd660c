//! The persisted device configuration.

use super::{ConfigError, WifiCredentials};
use std::fmt;
use std::str::FromStr;

/// Baud rates accepted for the command UART.
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Baud rate used when nothing valid is stored.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Longest BLE device name that still fits the advertising payload.
pub const MAX_BLE_NAME_LEN: usize = 29;

/// Longest manufacturer string exposed through the Device Information service.
pub const MAX_BLE_MANUFACTURER_LEN: usize = 32;

/// Which producer owns the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportMode {
    #[default]
    Uart,
    Websocket,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uart => "uart",
            Self::Websocket => "websocket",
        }
    }

    /// Storage encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Uart => 0,
            Self::Websocket => 1,
        }
    }

    /// Decode a stored byte; unknown values fall back to the default.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Websocket,
            _ => Self::Uart,
        }
    }
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uart" => Ok(Self::Uart),
            "websocket" => Ok(Self::Websocket),
            _ => Err(ConfigError::UnknownTransport(s.to_string())),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A baud rate from [`SUPPORTED_BAUD_RATES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudRate(u32);

impl BaudRate {
    /// Accept only members of the supported set.
    pub fn new(value: u32) -> Result<Self, ConfigError> {
        if SUPPORTED_BAUD_RATES.contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::UnsupportedBaud(value))
        }
    }

    /// Decode a stored value; anything unsupported becomes the default.
    pub fn sanitize(value: u32) -> Self {
        Self::new(value).unwrap_or_default()
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The device configuration singleton.
///
/// Loaded once at boot. The in-memory copy held by
/// [`SessionState`](crate::session::SessionState) is authoritative between
/// persists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Active command transport.
    pub transport: TransportMode,
    /// UART speed.
    pub uart_baud: BaudRate,
    /// Saved station credentials, `None` when unconfigured.
    pub wifi: Option<WifiCredentials>,
    /// Advertised BLE device name override.
    pub ble_device_name: Option<String>,
    /// Device Information manufacturer override.
    pub ble_manufacturer_name: Option<String>,
}

impl DeviceConfig {
    /// True iff a non-empty SSID is stored.
    pub fn has_wifi_credentials(&self) -> bool {
        self.wifi.as_ref().is_some_and(|c| !c.ssid.is_empty())
    }

    /// Saved SSID, if any.
    pub fn wifi_ssid(&self) -> Option<&str> {
        self.wifi
            .as_ref()
            .filter(|c| !c.ssid.is_empty())
            .map(|c| c.ssid.as_str())
    }

    /// Replace stored credentials; an empty SSID clears them.
    pub fn set_wifi(&mut self, creds: Option<WifiCredentials>) {
        self.wifi = creds.filter(|c| !c.ssid.is_empty());
    }

    /// Set or clear the BLE name override. Empty clears.
    pub fn set_ble_device_name(&mut self, name: Option<&str>) -> Result<(), ConfigError> {
        self.ble_device_name = normalize_identity("BLE name", name, MAX_BLE_NAME_LEN)?;
        Ok(())
    }

    /// Set or clear the manufacturer override. Empty clears.
    pub fn set_ble_manufacturer_name(&mut self, name: Option<&str>) -> Result<(), ConfigError> {
        self.ble_manufacturer_name =
            normalize_identity("BLE manufacturer", name, MAX_BLE_MANUFACTURER_LEN)?;
        Ok(())
    }
}

fn normalize_identity(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ConfigError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.len() > max {
        return Err(ConfigError::IdentityTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(Some(value.to_string()))
}
