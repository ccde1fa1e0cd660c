//! Configuration validation errors.

use std::fmt;

/// Errors raised when a configuration value is rejected.
///
/// These are produced synchronously at the API boundary; a rejected request
/// never partially mutates the stored configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Baud rate is not in the supported set.
    UnsupportedBaud(u32),
    /// Transport string is neither `uart` nor `websocket`.
    UnknownTransport(String),
    /// A BLE identity string is longer than the advertising payload allows.
    IdentityTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID is required"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "Password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "Password too long: {} bytes (max {})", len, max)
            }
            Self::UnsupportedBaud(baud) => write!(f, "Unsupported baud rate: {}", baud),
            Self::UnknownTransport(value) => write!(f, "Unknown transport: {}", value),
            Self::IdentityTooLong { field, len, max } => {
                write!(f, "{} too long: {} bytes (max {})", field, len, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
