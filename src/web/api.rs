//! HTTP configuration API.
//!
//! Routing and request handling are independent of the HTTP server so the
//! whole surface is testable on the host. [`HttpServer`](super::HttpServer)
//! turns an [`ApiResponse`] into a `tiny_http` response.
//!
//! # Routes
//!
//! | Path                          | Methods   |
//! |-------------------------------|-----------|
//! | `/`, `/index.html`            | GET       |
//! | `/api/config`                 | GET, POST |
//! | `/api/scan`, `/scan`          | GET       |
//! | `/api/wifi/state`             | GET       |
//! | `/api/transport`              | GET, POST |
//! | `/configure`                  | POST      |
//! | OS connectivity probes        | GET       |
//!
//! Unknown paths serve the portal page while the access point is up.

use crate::config::{
    BaudRate, ConfigError, DeviceConfig, TransportMode, WifiCredentials, SUPPORTED_BAUD_RATES,
};
use crate::outbound::EventSink;
use crate::portal::classify_probe;
use crate::session::SessionState;
use crate::status;
use crate::store::{ConfigStore, StoreError};
use crate::wifi::{NetworkInfo, WifiError, WifiHandle, WifiStatus};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tiny_http::Method;

/// Captive portal page.
pub const PORTAL_PAGE: &str = include_str!("index.html");

/// Headers sent with every response.
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-store, no-cache, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_HTML: &str = "text/html";
pub const CONTENT_TEXT: &str = "text/plain";

/// A rendered response, not yet bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// `Location` for redirects.
    pub location: Option<String>,
    /// `Allow` for 405 responses.
    pub allow: Option<&'static str>,
}

impl ApiResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: CONTENT_JSON,
            body: value.to_string(),
            location: None,
            allow: None,
        }
    }

    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: CONTENT_HTML,
            body: body.to_string(),
            location: None,
            allow: None,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: CONTENT_TEXT,
            body: body.to_string(),
            location: None,
            allow: None,
        }
    }

    pub fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: CONTENT_TEXT,
            body: String::new(),
            location: Some(location),
            allow: None,
        }
    }

    fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            allow: Some(allow),
            ..Self::json(405, json!({ "status": "error", "message": "Method not allowed" }))
        }
    }
}

/// A request rejected by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 400: malformed or invalid input. Nothing was changed.
    BadRequest(String),
    /// 409: conflicting operation in progress.
    Conflict(String),
    /// 503: the WiFi side cannot serve the request right now.
    Unavailable(String),
    /// 500
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Conflict(_) => 409,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::Conflict(m) | Self::Unavailable(m) | Self::Internal(m) => m,
        }
    }

    pub fn to_response(&self) -> ApiResponse {
        ApiResponse::json(
            self.status(),
            json!({ "status": "error", "message": self.message() }),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<WifiError> for ApiError {
    fn from(e: WifiError) -> Self {
        let message = e.to_string();
        match e.http_status() {
            400 => Self::BadRequest(message),
            409 => Self::Conflict(message),
            503 => Self::Unavailable(message),
            _ => Self::Internal(message),
        }
    }
}

/// What the API needs from the WiFi controller.
pub trait WifiControl: Send + Sync {
    fn status(&self) -> WifiStatus;
    fn request_connect(&self, ssid: &str, password: &str) -> Result<(), WifiError>;
    fn forget(&self) -> Result<(), WifiError>;
    fn scan(&self) -> Result<Vec<NetworkInfo>, WifiError>;
    fn is_busy(&self) -> bool;
}

impl WifiControl for WifiHandle {
    fn status(&self) -> WifiStatus {
        WifiHandle::status(self)
    }

    fn request_connect(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        WifiHandle::request_connect(self, ssid, password)
    }

    fn forget(&self) -> Result<(), WifiError> {
        WifiHandle::forget(self)
    }

    fn scan(&self) -> Result<Vec<NetworkInfo>, WifiError> {
        WifiHandle::scan(self)
    }

    fn is_busy(&self) -> bool {
        WifiHandle::is_busy(self)
    }
}

// ==================== Request bodies ====================

#[derive(Debug, Default, Deserialize)]
struct ConfigRequest {
    transport: Option<String>,
    uart: Option<UartPatch>,
    wifi: Option<WifiPatch>,
    ble: Option<BlePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct UartPatch {
    baud: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WifiPatch {
    ssid: Option<String>,
    password: Option<String>,
    #[serde(default)]
    forget: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BlePatch {
    name: Option<String>,
    manufacturer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportRequest {
    mode: Option<String>,
    baud: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    ssid: String,
    #[serde(default)]
    password: String,
}

enum WifiAction {
    Forget,
    Connect(WifiCredentials),
}

/// Validated `POST /api/config`. Applying it cannot fail validation.
struct ConfigChange {
    transport: Option<TransportMode>,
    baud: Option<BaudRate>,
    wifi: Option<WifiAction>,
    identity: Option<(Option<String>, Option<String>)>,
}

/// The API request handler.
pub struct ApiRouter {
    session: Arc<SessionState>,
    wifi: Arc<dyn WifiControl>,
    events: Arc<dyn EventSink>,
}

impl ApiRouter {
    pub fn new(
        session: Arc<SessionState>,
        wifi: Arc<dyn WifiControl>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session,
            wifi,
            events,
        }
    }

    /// Handle one request. `url` may carry a query string.
    pub fn handle(&self, method: &Method, url: &str, body: &str) -> ApiResponse {
        let path = url.split('?').next().unwrap_or(url);
        let get = *method == Method::Get;
        let post = *method == Method::Post;

        let result = match path {
            "/" | "/index.html" if get => Ok(ApiResponse::html(PORTAL_PAGE)),
            "/" | "/index.html" => Ok(ApiResponse::method_not_allowed("GET")),

            "/api/config" if get => Ok(ApiResponse::json(200, self.config_json())),
            "/api/config" if post => self.post_config(body),
            "/api/config" => Ok(ApiResponse::method_not_allowed("GET, POST")),

            "/api/scan" | "/scan" if get => self.scan(),
            "/api/scan" | "/scan" => Ok(ApiResponse::method_not_allowed("GET")),

            "/api/wifi/state" if get => Ok(ApiResponse::json(200, self.wifi_state_json())),
            "/api/wifi/state" => Ok(ApiResponse::method_not_allowed("GET")),

            "/api/transport" if get => Ok(ApiResponse::json(200, self.transport_json())),
            "/api/transport" if post => self.post_transport(body),
            "/api/transport" => Ok(ApiResponse::method_not_allowed("GET, POST")),

            "/configure" if post => self.post_configure(body),
            "/configure" => Ok(ApiResponse::method_not_allowed("POST")),

            _ => Ok(self.fallback(path)),
        };
        result.unwrap_or_else(|e| {
            if e.status() >= 500 {
                warn!("[http] {} {}: {}", method, path, e);
            }
            e.to_response()
        })
    }

    // ==================== GET handlers ====================

    fn config_json(&self) -> Value {
        let config = self.session.snapshot();
        let wifi = self.wifi.status();
        let ssid = config
            .wifi_ssid()
            .map(str::to_string)
            .or_else(|| wifi.station_ssid.clone());
        json!({
            "transport": config.transport.as_str(),
            "uart": {
                "baud": config.uart_baud.get(),
                "supported": SUPPORTED_BAUD_RATES,
            },
            "wifi": {
                "ssid": ssid,
                "connected": wifi.connected(),
                "ip": wifi.station_ip.map(|ip| ip.to_string()),
                "apActive": wifi.ap_active,
                "apSsid": wifi.ap_ssid,
                "portalUrl": wifi.portal_url(),
                "state": wifi.state.as_str(),
                "connecting": wifi.connect_in_progress,
            },
            "ble": {
                "name": config.ble_device_name,
                "manufacturer": config.ble_manufacturer_name,
                "connected": self.session.ble_connected(),
            },
        })
    }

    fn wifi_state_json(&self) -> Value {
        let mut value = self.wifi.status().published.to_json();
        if let Value::Object(map) = &mut value {
            map.insert("status".into(), json!("ok"));
        }
        value
    }

    fn transport_json(&self) -> Value {
        let config = self.session.snapshot();
        json!({
            "status": "ok",
            "mode": config.transport.as_str(),
            "baud": config.uart_baud.get(),
        })
    }

    fn scan(&self) -> Result<ApiResponse, ApiError> {
        let networks = self.wifi.scan()?;
        Ok(ApiResponse::json(
            200,
            json!({ "status": "ok", "networks": networks }),
        ))
    }

    fn fallback(&self, path: &str) -> ApiResponse {
        let wifi = self.wifi.status();
        if let Some(probe) = classify_probe(path) {
            return match wifi.portal_url() {
                Some(url) => ApiResponse::redirect(url),
                None => {
                    let (code, body) = probe.online_response(path);
                    if body.starts_with('<') {
                        ApiResponse {
                            status: code,
                            ..ApiResponse::html(body)
                        }
                    } else {
                        ApiResponse::text(code, body)
                    }
                }
            };
        }
        if wifi.ap_active {
            ApiResponse::html(PORTAL_PAGE)
        } else {
            ApiResponse::text(404, "Not found")
        }
    }

    // ==================== POST /api/config ====================

    fn post_config(&self, body: &str) -> Result<ApiResponse, ApiError> {
        let request: ConfigRequest = parse_body(body)?;
        let change = self.validate_config(request)?;
        self.apply_config(change)?;
        Ok(ApiResponse::json(200, json!({ "status": "ok" })))
    }

    fn validate_config(&self, request: ConfigRequest) -> Result<ConfigChange, ApiError> {
        let transport = request
            .transport
            .as_deref()
            .map(str::parse::<TransportMode>)
            .transpose()?;

        let baud = request
            .uart
            .and_then(|u| u.baud)
            .map(BaudRate::new)
            .transpose()?;

        let wifi = match request.wifi {
            Some(patch) if patch.forget => Some(WifiAction::Forget),
            Some(WifiPatch {
                ssid: None,
                password: None,
                ..
            })
            | None => None,
            Some(patch) => {
                let ssid = patch.ssid.unwrap_or_default();
                let creds = WifiCredentials::new(ssid.trim(), patch.password.unwrap_or_default())?;
                Some(WifiAction::Connect(creds))
            }
        };

        let identity = match request.ble {
            Some(patch) => {
                let mut candidate = self.session.snapshot();
                if let Some(name) = patch.name.as_deref() {
                    candidate.set_ble_device_name(Some(name))?;
                }
                if let Some(manufacturer) = patch.manufacturer.as_deref() {
                    candidate.set_ble_manufacturer_name(Some(manufacturer))?;
                }
                Some((candidate.ble_device_name, candidate.ble_manufacturer_name))
            }
            None => None,
        };

        if matches!(wifi, Some(WifiAction::Connect(_))) && self.wifi.is_busy() {
            return Err(WifiError::Busy.into());
        }

        Ok(ConfigChange {
            transport,
            baud,
            wifi,
            identity,
        })
    }

    fn apply_config(&self, change: ConfigChange) -> Result<(), ApiError> {
        // The WiFi hand-off is the only step that can still be refused, so
        // it goes first and nothing else is touched if it is.
        match &change.wifi {
            Some(WifiAction::Forget) => {
                self.wifi.forget()?;
                info!("[http] forget WiFi credentials requested");
            }
            Some(WifiAction::Connect(creds)) => {
                self.wifi.request_connect(&creds.ssid, &creds.password)?;
                info!("[http] connect to {:?} requested", creds.ssid);
            }
            None => {}
        }

        let current = self.session.snapshot();

        if let Some(mode) = change.transport.filter(|m| *m != current.transport) {
            self.session.update(|c| c.transport = mode);
            self.persist("transport", |store, c| store.save_transport(c.transport));
            info!("[http] transport set to {}", mode);
        }

        if let Some(baud) = change.baud.filter(|b| *b != current.uart_baud) {
            self.session.update(|c| c.uart_baud = baud);
            self.persist("baud rate", |store, c| store.save_baud(c.uart_baud));
            self.session.mark_uart_dirty();
            info!("[http] UART baud set to {}", baud);
        }

        if let Some((name, manufacturer)) = change.identity {
            if name != current.ble_device_name || manufacturer != current.ble_manufacturer_name {
                self.session.update(|c| {
                    c.ble_device_name = name;
                    c.ble_manufacturer_name = manufacturer;
                });
                self.persist("BLE identity", |store, c| {
                    store.save_ble_identity(
                        c.ble_device_name.as_deref(),
                        c.ble_manufacturer_name.as_deref(),
                    )
                });
                self.session.mark_identity_dirty();
            }
        }
        Ok(())
    }

    /// Persist after an in-memory change. A failed write keeps the
    /// in-memory value and is reported as a `warning` event.
    fn persist(
        &self,
        what: &str,
        f: impl FnOnce(&mut ConfigStore, &DeviceConfig) -> Result<(), StoreError>,
    ) {
        if let Err(e) = self.session.persist(f) {
            warn!("[http] failed to save {}: {}", what, e);
            self.events
                .emit(status::warning(&format!("Failed to save {}", what)));
        }
    }

    // ==================== Legacy routes ====================

    fn post_transport(&self, body: &str) -> Result<ApiResponse, ApiError> {
        let request: TransportRequest = parse_body(body)?;
        let mode = request
            .mode
            .as_deref()
            .unwrap_or("uart")
            .parse::<TransportMode>()
            .map_err(|_| ApiError::BadRequest("Invalid transport mode".into()))?;
        let baud = match request.baud {
            Some(value) => Some(
                u32::try_from(value)
                    .ok()
                    .and_then(|v| BaudRate::new(v).ok())
                    .ok_or_else(|| ApiError::BadRequest("Invalid baud rate".into()))?,
            ),
            None => None,
        };

        let current = self.session.snapshot();
        let baud_changed = baud.is_some_and(|b| b != current.uart_baud);
        self.session.update(|c| {
            c.transport = mode;
            if let Some(baud) = baud {
                c.uart_baud = baud;
            }
        });
        if baud_changed {
            self.session.mark_uart_dirty();
        }

        self.session
            .persist(|store, c| {
                store.save_transport(c.transport)?;
                store.save_baud(c.uart_baud)
            })
            .map_err(|e| {
                warn!("[http] failed to save transport: {}", e);
                ApiError::Internal("Failed to persist transport".into())
            })?;

        Ok(ApiResponse::json(200, self.transport_json()))
    }

    fn post_configure(&self, body: &str) -> Result<ApiResponse, ApiError> {
        let request: ConfigureRequest = parse_body(body)?;
        let ssid = request.ssid.trim();
        if ssid.is_empty() {
            return Err(ConfigError::SsidEmpty.into());
        }
        let creds = WifiCredentials::new(ssid, request.password)?;
        self.wifi.request_connect(&creds.ssid, &creds.password)?;
        info!("[http] portal connect to {:?} requested", creds.ssid);

        Ok(ApiResponse::json(
            200,
            json!({
                "status": "ok",
                "state": "connecting",
                "ssid": creds.ssid,
                "message": "Connecting",
            }),
        ))
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing request body".into()));
    }
    serde_json::from_str(body).map_err(|_| ApiError::BadRequest("Invalid JSON".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::RecordingSink;
    use crate::store::{KeyValueStore, MemoryStore};
    use crate::wifi::{AuthMode, PublishedState, WifiConnectionState, WifiPhase};
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeWifi {
        status: Mutex<WifiStatus>,
        busy: Mutex<bool>,
        connects: Mutex<Vec<(String, String)>>,
        forgets: Mutex<usize>,
        scan_result: Mutex<Option<Result<Vec<NetworkInfo>, WifiError>>>,
    }

    impl FakeWifi {
        fn ap_mode() -> Arc<Self> {
            let fake = Self::default();
            {
                let mut status = fake.status.lock().unwrap();
                status.ap_active = true;
                status.ap_ip = Some(Ipv4Addr::new(192, 168, 4, 1));
                status.ap_ssid = Some("ble-hid-3F2A".into());
            }
            Arc::new(fake)
        }

        fn connected() -> Arc<Self> {
            let fake = Self::default();
            {
                let mut status = fake.status.lock().unwrap();
                status.state = WifiConnectionState::Connected;
                status.station_ssid = Some("Home".into());
                status.station_ip = Some(Ipv4Addr::new(192, 168, 1, 100));
            }
            Arc::new(fake)
        }
    }

    impl WifiControl for FakeWifi {
        fn status(&self) -> WifiStatus {
            self.status.lock().unwrap().clone()
        }

        fn request_connect(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
            if *self.busy.lock().unwrap() {
                return Err(WifiError::Busy);
            }
            self.connects
                .lock()
                .unwrap()
                .push((ssid.to_string(), password.to_string()));
            Ok(())
        }

        fn forget(&self) -> Result<(), WifiError> {
            *self.forgets.lock().unwrap() += 1;
            Ok(())
        }

        fn scan(&self) -> Result<Vec<NetworkInfo>, WifiError> {
            self.scan_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(Vec::new()))
        }

        fn is_busy(&self) -> bool {
            *self.busy.lock().unwrap()
        }
    }

    struct Harness {
        router: ApiRouter,
        session: Arc<SessionState>,
        wifi: Arc<FakeWifi>,
        events: Arc<RecordingSink>,
        mem: MemoryStore,
    }

    fn harness(wifi: Arc<FakeWifi>) -> Harness {
        let mem = MemoryStore::new();
        let session = SessionState::load(ConfigStore::new(mem.clone()));
        let events = RecordingSink::new();
        let router = ApiRouter::new(session.clone(), wifi.clone(), events.clone());
        Harness {
            router,
            session,
            wifi,
            events,
            mem,
        }
    }

    fn body(response: &ApiResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    // ==================== GET /api/config Tests ====================

    #[test]
    fn test_config_reports_ap_mode_on_fresh_boot() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(&Method::Get, "/api/config", "");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, CONTENT_JSON);

        let value = body(&response);
        assert_eq!(value["transport"], "uart");
        assert_eq!(value["uart"]["baud"], 115200);
        assert_eq!(value["uart"]["supported"].as_array().unwrap().len(), 8);
        assert_eq!(value["wifi"]["apActive"], true);
        assert_eq!(value["wifi"]["connected"], false);
        assert_eq!(value["wifi"]["portalUrl"], "http://192.168.4.1/");
        assert_eq!(value["ble"]["connected"], false);
    }

    #[test]
    fn test_config_reports_station_ip() {
        let h = harness(FakeWifi::connected());
        let value = body(&h.router.handle(&Method::Get, "/api/config?x=1", ""));
        assert_eq!(value["wifi"]["connected"], true);
        assert_eq!(value["wifi"]["ssid"], "Home");
        assert_eq!(value["wifi"]["ip"], "192.168.1.100");
        assert!(value["wifi"]["portalUrl"].is_null());
    }

    // ==================== POST /api/config Tests ====================

    #[test]
    fn test_unsupported_baud_rejected_without_change() {
        let h = harness(FakeWifi::ap_mode());
        for baud in [12345, 0, 1_000_000] {
            let payload = format!(r#"{{"uart":{{"baud":{}}}}}"#, baud);
            let response = h.router.handle(&Method::Post, "/api/config", &payload);
            assert_eq!(response.status, 400);
            assert_eq!(body(&response)["status"], "error");
        }
        assert_eq!(h.session.snapshot().uart_baud.get(), 115200);
        assert!(h.mem.get_u32("device", "baud").unwrap().is_none());
        assert!(!h.session.take_uart_dirty());
    }

    #[test]
    fn test_supported_baud_applied_and_persisted() {
        let h = harness(FakeWifi::ap_mode());
        let response = h
            .router
            .handle(&Method::Post, "/api/config", r#"{"uart":{"baud":9600}}"#);
        assert_eq!(response.status, 200);
        assert_eq!(body(&response), json!({ "status": "ok" }));
        assert_eq!(h.mem.get_u32("device", "baud").unwrap(), Some(9600));
        assert!(h.session.take_uart_dirty());

        let value = body(&h.router.handle(&Method::Get, "/api/config", ""));
        assert_eq!(value["uart"]["baud"], 9600);
    }

    #[test]
    fn test_invalid_transport_rejects_whole_request() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"transport":"bluetooth","uart":{"baud":9600}}"#,
        );
        assert_eq!(response.status, 400);
        assert_eq!(h.session.snapshot().uart_baud.get(), 115200);
        assert_eq!(h.session.transport(), TransportMode::Uart);
    }

    #[test]
    fn test_transport_switch_persisted() {
        let h = harness(FakeWifi::ap_mode());
        let response = h
            .router
            .handle(&Method::Post, "/api/config", r#"{"transport":"websocket"}"#);
        assert_eq!(response.status, 200);
        assert_eq!(h.session.transport(), TransportMode::Websocket);
        assert_eq!(h.mem.get_u8("device", "transport").unwrap(), Some(1));
    }

    #[test]
    fn test_wifi_credentials_forwarded() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"wifi":{"ssid":" Home ","password":"secret123"}}"#,
        );
        assert_eq!(response.status, 200);
        assert_eq!(
            *h.wifi.connects.lock().unwrap(),
            vec![("Home".to_string(), "secret123".to_string())]
        );
    }

    #[test]
    fn test_forget_takes_precedence() {
        let h = harness(FakeWifi::connected());
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"wifi":{"ssid":"Other","password":"password1","forget":true}}"#,
        );
        assert_eq!(response.status, 200);
        assert_eq!(*h.wifi.forgets.lock().unwrap(), 1);
        assert!(h.wifi.connects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_ssid_rejected() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"wifi":{"ssid":"  ","password":"secret123"}}"#,
        );
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["message"], "SSID is required");
    }

    #[test]
    fn test_busy_wifi_rejects_before_other_changes() {
        let h = harness(FakeWifi::ap_mode());
        *h.wifi.busy.lock().unwrap() = true;
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"transport":"websocket","wifi":{"ssid":"Home","password":"secret123"}}"#,
        );
        assert_eq!(response.status, 409);
        assert_eq!(
            body(&response)["message"],
            "A WiFi connection attempt is already in progress"
        );
        assert_eq!(h.session.transport(), TransportMode::Uart);
    }

    #[test]
    fn test_identity_override_sets_dirty_flag() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"ble":{"name":"Desk Keyboard"}}"#,
        );
        assert_eq!(response.status, 200);
        assert_eq!(
            h.session.snapshot().ble_device_name.as_deref(),
            Some("Desk Keyboard")
        );
        assert_eq!(
            h.mem.get_str("device", "ble_name").unwrap().as_deref(),
            Some("Desk Keyboard")
        );
        assert!(h.session.take_identity_dirty());

        // Same value again: no restart requested
        h.router.handle(
            &Method::Post,
            "/api/config",
            r#"{"ble":{"name":"Desk Keyboard"}}"#,
        );
        assert!(!h.session.take_identity_dirty());

        h.router
            .handle(&Method::Post, "/api/config", r#"{"ble":{"name":""}}"#);
        assert!(h.session.snapshot().ble_device_name.is_none());
        assert!(h.session.take_identity_dirty());
    }

    #[test]
    fn test_persist_failure_warns_but_applies() {
        let h = harness(FakeWifi::ap_mode());
        h.mem.set_fail_writes(true);
        let response = h
            .router
            .handle(&Method::Post, "/api/config", r#"{"transport":"websocket"}"#);
        assert_eq!(response.status, 200);
        assert_eq!(h.session.transport(), TransportMode::Websocket);

        let warnings = h.events.named("warning");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0]["detail"], "Failed to save transport");
    }

    #[test]
    fn test_malformed_json() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(&Method::Post, "/api/config", "{not json");
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["message"], "Invalid JSON");
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_lists_networks() {
        let h = harness(FakeWifi::ap_mode());
        *h.wifi.scan_result.lock().unwrap() = Some(Ok(vec![NetworkInfo {
            ssid: "Home".into(),
            rssi: -40,
            channel: 6,
            auth: AuthMode::Wpa2Psk,
            secure: true,
            hidden: false,
        }]));
        let response = h.router.handle(&Method::Get, "/scan", "");
        assert_eq!(response.status, 200);
        let value = body(&response);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["networks"][0]["ssid"], "Home");
        assert_eq!(value["networks"][0]["auth"], "wpa2_psk");
    }

    #[test]
    fn test_scan_errors_map_to_status() {
        let h = harness(FakeWifi::ap_mode());
        *h.wifi.scan_result.lock().unwrap() = Some(Err(WifiError::NotReady));
        let response = h.router.handle(&Method::Get, "/api/scan", "");
        assert_eq!(response.status, 503);
        assert_eq!(body(&response)["message"], "WiFi interface not ready");

        *h.wifi.scan_result.lock().unwrap() = Some(Err(WifiError::ScanFailed("-1".into())));
        let response = h.router.handle(&Method::Get, "/api/scan", "");
        assert_eq!(response.status, 500);
        assert_eq!(body(&response)["message"], "Scan failed");
    }

    // ==================== Legacy Route Tests ====================

    #[test]
    fn test_wifi_state_route() {
        let h = harness(FakeWifi::ap_mode());
        h.wifi.status.lock().unwrap().published = PublishedState {
            phase: Some(WifiPhase::Ap),
            ssid: Some("ble-hid-3F2A".into()),
            message: None,
        };
        let value = body(&h.router.handle(&Method::Get, "/api/wifi/state", ""));
        assert_eq!(value["status"], "ok");
        assert_eq!(value["state"], "ap");
        assert_eq!(value["ssid"], "ble-hid-3F2A");
    }

    #[test]
    fn test_transport_route_round_trip() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/api/transport",
            r#"{"mode":"websocket","baud":57600}"#,
        );
        assert_eq!(response.status, 200);
        let value = body(&response);
        assert_eq!(value["mode"], "websocket");
        assert_eq!(value["baud"], 57600);
        assert!(h.session.take_uart_dirty());

        let value = body(&h.router.handle(&Method::Get, "/api/transport", ""));
        assert_eq!(value["mode"], "websocket");
    }

    #[test]
    fn test_transport_route_rejects_bad_baud() {
        let h = harness(FakeWifi::ap_mode());
        let response = h
            .router
            .handle(&Method::Post, "/api/transport", r#"{"baud":-5}"#);
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["message"], "Invalid baud rate");

        let response = h.router.handle(&Method::Post, "/api/transport", "");
        assert_eq!(body(&response)["message"], "Missing request body");
    }

    #[test]
    fn test_transport_route_persist_failure() {
        let h = harness(FakeWifi::ap_mode());
        h.mem.set_fail_writes(true);
        let response = h
            .router
            .handle(&Method::Post, "/api/transport", r#"{"mode":"uart"}"#);
        assert_eq!(response.status, 500);
        assert_eq!(body(&response)["message"], "Failed to persist transport");
    }

    #[test]
    fn test_configure_route() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(
            &Method::Post,
            "/configure",
            r#"{"ssid":"Home ","password":"secret123"}"#,
        );
        assert_eq!(response.status, 200);
        let value = body(&response);
        assert_eq!(value["state"], "connecting");
        assert_eq!(value["ssid"], "Home");
        assert_eq!(value["message"], "Connecting");

        *h.wifi.busy.lock().unwrap() = true;
        let response = h.router.handle(
            &Method::Post,
            "/configure",
            r#"{"ssid":"Home","password":"secret123"}"#,
        );
        assert_eq!(response.status, 409);

        let response = h
            .router
            .handle(&Method::Post, "/configure", r#"{"password":"x"}"#);
        assert_eq!(body(&response)["message"], "SSID is required");
    }

    // ==================== Portal Tests ====================

    #[test]
    fn test_probe_redirects_while_ap_active() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(&Method::Get, "/generate_204", "");
        assert_eq!(response.status, 302);
        assert_eq!(response.location.as_deref(), Some("http://192.168.4.1/"));
    }

    #[test]
    fn test_probe_answers_online_when_connected() {
        let h = harness(FakeWifi::connected());
        let response = h.router.handle(&Method::Get, "/generate_204", "");
        assert_eq!(response.status, 204);

        let response = h.router.handle(&Method::Get, "/hotspot-detect.html", "");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, CONTENT_HTML);
    }

    #[test]
    fn test_unknown_path_depends_on_ap() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(&Method::Get, "/some/where", "");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, PORTAL_PAGE);

        let h = harness(FakeWifi::connected());
        let response = h.router.handle(&Method::Get, "/some/where", "");
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "Not found");
    }

    #[test]
    fn test_wrong_method() {
        let h = harness(FakeWifi::ap_mode());
        let response = h.router.handle(&Method::Delete, "/api/config", "");
        assert_eq!(response.status, 405);
        assert_eq!(response.allow, Some("GET, POST"));

        let response = h.router.handle(&Method::Get, "/configure", "");
        assert_eq!(response.status, 405);
    }
}
