//! Status and event JSON messages.
//!
//! Uniform across transports:
//!
//! ```json
//! {"status":"ok"}
//! {"status":"error","message":"Input too long"}
//! {"event":"ble_connected"}
//! {"event":"transport_mode","detail":"websocket"}
//! ```

use serde_json::json;

pub fn ok() -> String {
    json!({ "status": "ok" }).to_string()
}

pub fn error(message: &str) -> String {
    json!({ "status": "error", "message": message }).to_string()
}

/// Event without a detail field.
pub fn event(name: &str) -> String {
    json!({ "event": name }).to_string()
}

pub fn event_with_detail(name: &str, detail: &str) -> String {
    json!({ "event": name, "detail": detail }).to_string()
}

/// Persistence failure notice.
pub fn warning(detail: &str) -> String {
    event_with_detail("warning", detail)
}

/// Event names emitted by the bridge.
pub mod events {
    pub const READY: &str = "ready";
    pub const TRANSPORT_MODE: &str = "transport_mode";
    pub const WIFI_STATE: &str = "wifi_state";
    pub const WIFI_CONFIG_MODE: &str = "wifi_config_mode";
    pub const WIFI_CONNECTING: &str = "wifi_connecting";
    pub const WIFI_STA_CONNECTED: &str = "wifi_sta_connected";
    pub const BLE_CONNECTED: &str = "ble_connected";
    pub const BLE_DISCONNECTED: &str = "ble_disconnected";
}
