//! WiFi credential types.
//!
//! Platform-independent, host-testable.
//!
//! # Example
//!
//! ```
//! use ble_hid_bridge::config::WifiCredentials;
//!
//! let creds = WifiCredentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!creds.is_open());
//! ```

use super::ConfigError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Station credentials.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiCredentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    pub password: String,
}

impl WifiCredentials {
    /// Create validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Credentials for an open network (no password).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Build credentials without validation.
    ///
    /// Used when loading from storage, where a value that fails today's
    /// rules must still be visible so it can be overwritten or forgotten.
    pub fn unchecked(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// Validate SSID and password lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty is OK for open networks
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }

        Ok(())
    }

    /// True if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Validation Tests ====================

    #[test]
    fn test_valid_credentials() {
        let creds = WifiCredentials::new("TestNetwork", "password123").unwrap();
        assert_eq!(creds.ssid, "TestNetwork");
        assert_eq!(creds.password, "password123");
        assert!(!creds.is_open());
    }

    #[test]
    fn test_open_network() {
        let creds = WifiCredentials::open("OpenNetwork").unwrap();
        assert!(creds.is_open());
    }

    #[test]
    fn test_empty_ssid() {
        assert_eq!(
            WifiCredentials::new("", "password123"),
            Err(ConfigError::SsidEmpty)
        );
    }

    #[test]
    fn test_ssid_length_limits() {
        assert!(WifiCredentials::new("a".repeat(32), "password123").is_ok());
        assert!(matches!(
            WifiCredentials::new("a".repeat(33), "password123"),
            Err(ConfigError::SsidTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_password_length_limits() {
        assert!(matches!(
            WifiCredentials::new("Net", "short"),
            Err(ConfigError::PasswordTooShort { .. })
        ));
        assert!(WifiCredentials::new("Net", "12345678").is_ok());
        assert!(WifiCredentials::new("Net", "a".repeat(64)).is_ok());
        assert!(matches!(
            WifiCredentials::new("Net", "a".repeat(65)),
            Err(ConfigError::PasswordTooLong { .. })
        ));
    }

    #[test]
    fn test_unchecked_skips_validation() {
        let creds = WifiCredentials::unchecked("Net", "abc");
        assert!(creds.validate().is_err());
        assert_eq!(creds.password, "abc");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = WifiCredentials::new("Home", "secret123").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("Home"));
        assert!(!debug.contains("secret123"));
    }
}
