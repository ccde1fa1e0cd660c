//! Command rejection reasons. `Display` is the client-facing message.

use crate::ble::HidError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    TooLarge,
    Parse(String),
    MissingDevice,
    UnknownDevice(String),
    KeyboardNotConnected,
    MouseNotConnected,
    UnknownAction { device: &'static str, action: String },

    UnknownKey(String),
    InvalidKeyCode(i64),
    InvalidKeyEntry,
    TooManyKeys,
    KeyRequired,

    UnknownButton(String),
    InvalidButtonMask(i64),
    InvalidButtonEntry,
    MovementRequired(&'static str),
    ButtonsRequired(&'static str),

    UnknownConsumerKey(String),
    InvalidConsumerEntry,
    TooManyConsumerKeys,
    ConsumerKeyRequired,

    Hid(HidError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge => write!(f, "JSON payload too large"),
            Self::Parse(msg) => write!(f, "JSON parse error: {}", msg),
            Self::MissingDevice => write!(f, "Command missing device/type field"),
            Self::UnknownDevice(d) => write!(f, "Unknown device type: {}", d),
            Self::KeyboardNotConnected => write!(f, "BLE keyboard not connected"),
            Self::MouseNotConnected => write!(f, "BLE connection not established"),
            Self::UnknownAction { device, action } => {
                write!(f, "Unknown {} action: {}", device, action)
            }
            Self::UnknownKey(k) => write!(f, "Unknown key: {}", k),
            Self::InvalidKeyCode(c) => write!(f, "Invalid key code: {}", c),
            Self::InvalidKeyEntry => write!(f, "Invalid key entry"),
            Self::TooManyKeys => write!(f, "Too many keys in combo"),
            Self::KeyRequired => write!(f, "keyboard action requires key(s) or code"),
            Self::UnknownButton(b) => write!(f, "Unknown mouse button: {}", b),
            Self::InvalidButtonMask(m) => write!(f, "Invalid mouse button mask: {}", m),
            Self::InvalidButtonEntry => write!(f, "Invalid mouse button entry"),
            Self::MovementRequired(action) => write!(f, "mouse {} requires movement", action),
            Self::ButtonsRequired(action) => write!(f, "mouse {} requires button(s)", action),
            Self::UnknownConsumerKey(k) => write!(f, "Unknown consumer key: {}", k),
            Self::InvalidConsumerEntry => write!(f, "Invalid consumer key entry"),
            Self::TooManyConsumerKeys => write!(f, "Too many consumer keys"),
            Self::ConsumerKeyRequired => write!(f, "consumer action requires key"),
            Self::Hid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HidError> for CommandError {
    fn from(e: HidError) -> Self {
        Self::Hid(e)
    }
}
