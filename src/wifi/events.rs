//! Driver event notifications.
//!
//! Driver callbacks run in the system event task. They only set flags here;
//! the controller consumes them on its own tick, so no state machine field
//! is ever touched from the callback context.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// ESP-IDF `wifi_err_reason_t` values that matter for fast-fail.
pub mod reason {
    pub const AUTH_EXPIRE: u16 = 2;
    pub const FOUR_WAY_HANDSHAKE_TIMEOUT: u16 = 15;
    pub const BEACON_TIMEOUT: u16 = 200;
    pub const NO_AP_FOUND: u16 = 201;
    pub const AUTH_FAIL: u16 = 202;
    pub const ASSOC_FAIL: u16 = 203;
    pub const HANDSHAKE_TIMEOUT: u16 = 204;
    pub const CONNECTION_FAIL: u16 = 205;
}

/// Why the station dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Wrong password or handshake rejected.
    AuthFailed,
    /// SSID not visible.
    NoApFound,
    /// Anything else: link loss, beacon timeout, AP kicked us.
    Other(u16),
}

impl DisconnectKind {
    pub fn from_reason(code: u16) -> Self {
        match code {
            reason::AUTH_EXPIRE
            | reason::FOUR_WAY_HANDSHAKE_TIMEOUT
            | reason::AUTH_FAIL
            | reason::HANDSHAKE_TIMEOUT => Self::AuthFailed,
            reason::NO_AP_FOUND => Self::NoApFound,
            other => Self::Other(other),
        }
    }

    /// Fast-fail kinds abort a connect attempt without waiting for the timeout.
    pub fn is_fatal_for_attempt(self) -> bool {
        matches!(self, Self::AuthFailed | Self::NoApFound)
    }
}

/// Events observed since the last [`WifiEventFlags::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WifiEvents {
    pub disconnected: Option<DisconnectKind>,
}

/// Lock-free event latch written by driver callbacks.
#[derive(Debug, Default)]
pub struct WifiEventFlags {
    disconnected: AtomicBool,
    reason: AtomicU16,
}

impl WifiEventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_disconnected(&self, reason: u16) {
        self.reason.store(reason, Ordering::Relaxed);
        self.disconnected.store(true, Ordering::Release);
    }

    /// Consume all pending events.
    pub fn take(&self) -> WifiEvents {
        let disconnected = self
            .disconnected
            .swap(false, Ordering::AcqRel)
            .then(|| DisconnectKind::from_reason(self.reason.load(Ordering::Relaxed)));
        WifiEvents { disconnected }
    }

    /// Drop anything pending, e.g. before starting a fresh attempt.
    pub fn clear(&self) {
        let _ = self.take();
    }
}
