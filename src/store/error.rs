//! Persistence errors.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure (host store).
    Io(io::Error),
    /// Backend-specific failure, e.g. an NVS error code.
    Backend(String),
    /// Value read back after a write did not match what was written.
    VerificationFailed { namespace: String, key: String },
    /// Stored value has the wrong type or could not be decoded.
    InvalidFormat(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O error: {}", e),
            Self::Backend(msg) => write!(f, "storage backend error: {}", msg),
            Self::VerificationFailed { namespace, key } => {
                write!(f, "verification failed for {}/{}", namespace, key)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid stored value: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidFormat(e.to_string())
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for StoreError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Backend(format!("{:?}", e))
    }
}
