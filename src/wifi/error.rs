//! Station controller errors.

use super::{DisconnectKind, RadioError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    /// Credentials without an SSID.
    EmptySsid,
    /// Another connect request is queued or running.
    Busy,
    /// Interface could not be brought up for the operation.
    NotReady,
    /// Controller did not answer in time (usually mid connect attempt).
    Unavailable,
    /// Radio scan failed.
    ScanFailed(String),
    /// Controller task is gone.
    Stopped,
    Radio(RadioError),
}

impl WifiError {
    /// HTTP status used when this error reaches the API.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::EmptySsid => 400,
            Self::Busy => 409,
            Self::NotReady | Self::Unavailable | Self::Stopped => 503,
            Self::ScanFailed(_) | Self::Radio(_) => 500,
        }
    }
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySsid => write!(f, "SSID is required"),
            Self::Busy => write!(f, "A WiFi connection attempt is already in progress"),
            Self::NotReady => write!(f, "WiFi interface not ready"),
            Self::Unavailable => write!(f, "WiFi busy"),
            Self::ScanFailed(_) => write!(f, "Scan failed"),
            Self::Stopped => write!(f, "WiFi controller stopped"),
            Self::Radio(e) => write!(f, "WiFi error: {}", e),
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Radio(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RadioError> for WifiError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

/// Why a connection attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AuthFailed,
    NoApFound,
    TimedOut,
    StartFailed(String),
}

impl FailureReason {
    /// Text used in `wifi_state` events.
    pub fn message(&self) -> &str {
        match self {
            Self::AuthFailed => "Authentication failed",
            Self::NoApFound => "Network not found",
            Self::TimedOut => "Connection timed out",
            Self::StartFailed(_) => "Failed to start WiFi",
        }
    }
}

impl From<DisconnectKind> for FailureReason {
    fn from(kind: DisconnectKind) -> Self {
        match kind {
            DisconnectKind::AuthFailed => Self::AuthFailed,
            DisconnectKind::NoApFound => Self::NoApFound,
            DisconnectKind::Other(_) => Self::TimedOut,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFailed(detail) => write!(f, "{}: {}", self.message(), detail),
            _ => f.write_str(self.message()),
        }
    }
}

/// Result of [`set_credentials`](super::WifiStationController::set_credentials).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// New network joined; credentials persisted.
    Connected { ssid: String },
    /// New network failed; re-associated to the previous one.
    RolledBack { previous_ssid: String, reason: FailureReason },
    /// Attempt failed; back in access-point mode.
    Failed { reason: FailureReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(WifiError::EmptySsid.http_status(), 400);
        assert_eq!(WifiError::Busy.http_status(), 409);
        assert_eq!(WifiError::NotReady.http_status(), 503);
        assert_eq!(WifiError::ScanFailed("x".into()).http_status(), 500);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            WifiError::Busy.to_string(),
            "A WiFi connection attempt is already in progress"
        );
        assert_eq!(FailureReason::TimedOut.message(), "Connection timed out");
    }

    #[test]
    fn test_fatal_disconnects_map_to_failures() {
        assert_eq!(
            FailureReason::from(DisconnectKind::from_reason(202)),
            FailureReason::AuthFailed
        );
        assert_eq!(
            FailureReason::from(DisconnectKind::from_reason(201)),
            FailureReason::NoApFound
        );
        assert_eq!(
            FailureReason::from(DisconnectKind::AuthFailed).message(),
            "Authentication failed"
        );
    }
}
