//! Connection state, the shared status snapshot, and `wifi_state` events.

use crate::status::events::WIFI_STATE;
use serde_json::{json, Map, Value};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// The station controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WifiConnectionState {
    /// Soft-AP (and captive portal) up, station not connected.
    #[default]
    AccessPointOnly,
    /// A connection attempt is in flight.
    Connecting,
    /// Station connected, AP still up until the grace window ends.
    TransitioningToSta,
    /// Station connected, AP down.
    Connected,
}

impl WifiConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessPointOnly => "access_point_only",
            Self::Connecting => "connecting",
            Self::TransitioningToSta => "transitioning_to_sta",
            Self::Connected => "connected",
        }
    }

    pub fn is_station_connected(self) -> bool {
        matches!(self, Self::Connected | Self::TransitioningToSta)
    }
}

/// Phase names published in `wifi_state` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiPhase {
    Ap,
    Connecting,
    Connected,
    Failed,
    Idle,
}

impl WifiPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ap => "ap",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Idle => "idle",
        }
    }
}

/// Last published `wifi_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedState {
    pub phase: Option<WifiPhase>,
    pub ssid: Option<String>,
    pub message: Option<String>,
}

impl PublishedState {
    /// Fields of the event, without the `event` key.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "state".into(),
            Value::from(self.phase.map(WifiPhase::as_str).unwrap_or("")),
        );
        if let Some(ssid) = self.ssid.as_deref().filter(|s| !s.is_empty()) {
            map.insert("ssid".into(), Value::from(ssid));
        }
        if let Some(message) = self.message.as_deref().filter(|s| !s.is_empty()) {
            map.insert("message".into(), Value::from(message));
        }
        Value::Object(map)
    }

    pub fn to_event(&self) -> String {
        let mut value = self.to_json();
        if let Value::Object(map) = &mut value {
            map.insert("event".into(), json!(WIFI_STATE));
        }
        value.to_string()
    }
}

/// Deduplicating `wifi_state` publisher.
///
/// A missing SSID keeps the previous one; a missing message clears it.
#[derive(Debug, Default)]
pub struct WifiStatePublisher {
    last: PublishedState,
}

impl WifiStatePublisher {
    /// Returns the event to send, or `None` if nothing changed.
    pub fn update(
        &mut self,
        phase: WifiPhase,
        ssid: Option<&str>,
        message: Option<&str>,
    ) -> Option<String> {
        let next = PublishedState {
            phase: Some(phase),
            ssid: ssid.map(str::to_string).or_else(|| self.last.ssid.clone()),
            message: message.map(str::to_string),
        };
        if next == self.last {
            return None;
        }
        self.last = next;
        Some(self.last.to_event())
    }

    pub fn last(&self) -> &PublishedState {
        &self.last
    }
}

/// Read-only view of the WiFi subsystem for the HTTP API.
#[derive(Debug, Clone, Default)]
pub struct WifiStatus {
    pub state: WifiConnectionState,
    pub station_ssid: Option<String>,
    pub station_ip: Option<Ipv4Addr>,
    pub ap_active: bool,
    pub ap_ssid: Option<String>,
    pub ap_ip: Option<Ipv4Addr>,
    /// A connect request is queued or running.
    pub connect_in_progress: bool,
    pub published: PublishedState,
}

impl WifiStatus {
    pub fn connected(&self) -> bool {
        self.state.is_station_connected()
    }

    pub fn portal_url(&self) -> Option<String> {
        self.ap_ip
            .filter(|_| self.ap_active)
            .map(|ip| format!("http://{}/", ip))
    }
}

pub type SharedWifiStatus = Arc<Mutex<WifiStatus>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_publisher_dedupes() {
        let mut p = WifiStatePublisher::default();
        assert!(p.update(WifiPhase::Ap, Some("ble-hid-1234"), None).is_some());
        assert!(p.update(WifiPhase::Ap, Some("ble-hid-1234"), None).is_none());
        assert!(p.update(WifiPhase::Connecting, Some("Home"), None).is_some());
    }

    #[test]
    fn test_ssid_sticky_message_not() {
        let mut p = WifiStatePublisher::default();
        p.update(WifiPhase::Connecting, Some("Home"), None);
        let failed = parse(&p.update(WifiPhase::Failed, None, Some("Connection timed out")).unwrap());
        assert_eq!(failed["event"], "wifi_state");
        assert_eq!(failed["state"], "failed");
        assert_eq!(failed["ssid"], "Home");
        assert_eq!(failed["message"], "Connection timed out");

        let ap = parse(&p.update(WifiPhase::Ap, Some("ble-hid-1234"), None).unwrap());
        assert!(ap.get("message").is_none());
    }

    #[test]
    fn test_empty_fields_omitted() {
        let state = PublishedState {
            phase: Some(WifiPhase::Idle),
            ssid: Some(String::new()),
            message: None,
        };
        let value = state.to_json();
        assert_eq!(value["state"], "idle");
        assert!(value.get("ssid").is_none());
    }

    #[test]
    fn test_portal_url_only_when_ap_active() {
        let mut status = WifiStatus {
            ap_ip: Some(Ipv4Addr::new(192, 168, 4, 1)),
            ..Default::default()
        };
        assert_eq!(status.portal_url(), None);
        status.ap_active = true;
        assert_eq!(status.portal_url().as_deref(), Some("http://192.168.4.1/"));
    }
}
