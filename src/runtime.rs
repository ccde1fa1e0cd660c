//! Bridge startup and task wiring.
//!
//! [`start`] takes the platform's hardware seams, builds the shared state and
//! spawns the long-running tasks:
//!
//! | Task    | Core | Owns                                              |
//! |---------|------|---------------------------------------------------|
//! | `wifi`  | 0    | [`WifiStationController`] + captive portal DNS    |
//! | `coord` | 0    | [`TransportCoordinator`] (UART polling, WS pump)  |
//! | `ble`   | 1    | [`BleSessionManager`] + [`CommandDispatcher`]     |
//!
//! plus the HTTP and WebSocket servers. The BLE task waits
//! [`BLE_START_DELAY`] before bringing up the stack so WiFi initialises
//! first on the shared radio.

use crate::ble::{BleSessionManager, BleStackState, HidBackend, HidDevice};
use crate::clock::{deadline_reached, Clock, Millis};
use crate::command::{command_channel, CommandReceiver, EnqueueError, COMMAND_QUEUE_CAPACITY};
use crate::config::BaudRate;
use crate::coordinator::TransportCoordinator;
use crate::dispatch::CommandDispatcher;
use crate::outbound::{EventSink, Outbox};
use crate::portal::{CaptivePortalService, DNS_PORT};
use crate::session::SessionState;
use crate::status::{self, events};
use crate::store::{ConfigStore, StoreError};
use crate::uart::{SerialPort, UartTransport};
use crate::web::{
    ApiRouter, ClientRegistry, HttpServer, WebSocketTransport, WsServer, HTTP_PORT, WS_PORT,
};
use crate::wifi::{wifi_channel, RadioError, WifiEventFlags, WifiRadio, WifiStationController};
use log::{error, info, warn};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay before the BLE stack starts.
pub const BLE_START_DELAY: Duration = Duration::from_millis(1500);

/// How long the BLE task waits for a command per iteration.
pub const BLE_RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// Pause between BLE start attempts after a failure.
pub const BLE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// WiFi controller tick.
pub const WIFI_TICK: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub enum BridgeError {
    Store(StoreError),
    Radio(RadioError),
    /// Server bind or task spawn failed.
    Io(io::Error),
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "config store: {}", e),
            Self::Radio(e) => write!(f, "radio: {}", e),
            Self::Io(e) => write!(f, "I/O: {}", e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP-IDF: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Radio(e) => Some(e),
            Self::Io(e) => Some(e),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => Some(e),
        }
    }
}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<RadioError> for BridgeError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for BridgeError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

/// Hardware the bridge runs on.
pub struct Platform {
    pub store: ConfigStore,
    pub radio: Box<dyn WifiRadio>,
    /// Latch the radio's driver callbacks write to.
    pub wifi_flags: Arc<WifiEventFlags>,
    /// Serial port, opened at the default baud rate.
    pub serial: Box<dyn SerialPort>,
    pub hid: Box<dyn HidBackend>,
    pub clock: Arc<dyn Clock>,
}

/// Ports and delays. Defaults are the firmware values.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub http_port: u16,
    pub ws_port: u16,
    pub dns_port: u16,
    pub ble_start_delay: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            http_port: HTTP_PORT,
            ws_port: WS_PORT,
            dns_port: DNS_PORT,
            ble_start_delay: BLE_START_DELAY,
        }
    }
}

/// A running bridge. Dropping it stops the HTTP and WebSocket servers;
/// the tasks run for the life of the process.
pub struct Bridge {
    session: Arc<SessionState>,
    outbox: Arc<Outbox>,
    http: HttpServer,
    ws: WsServer,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn http_port(&self) -> u16 {
        self.http.port()
    }

    pub fn ws_port(&self) -> u16 {
        self.ws.port()
    }

    /// Block on the tasks. Only returns if one of them panics.
    pub fn wait(self) {
        for task in self.tasks {
            if task.join().is_err() {
                error!("[bridge] task panicked");
            }
        }
    }
}

/// Which core a task is pinned to on ESP32. Ignored on the host.
#[derive(Debug, Clone, Copy)]
enum TaskCore {
    Network,
    Ble,
}

fn spawn_task<F>(
    name: &str,
    stack_size: usize,
    core: TaskCore,
    body: F,
) -> Result<JoinHandle<()>, BridgeError>
where
    F: FnOnce() + Send + 'static,
{
    #[cfg(feature = "esp32")]
    {
        use esp_idf_hal::cpu::Core;
        use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
        ThreadSpawnConfiguration {
            stack_size,
            pin_to_core: Some(match core {
                TaskCore::Network => Core::Core0,
                TaskCore::Ble => Core::Core1,
            }),
            ..Default::default()
        }
        .set()?;
    }
    #[cfg(not(feature = "esp32"))]
    let _ = core;

    let handle = thread::Builder::new()
        .name(name.into())
        .stack_size(stack_size)
        .spawn(body)?;

    #[cfg(feature = "esp32")]
    esp_idf_hal::task::thread::ThreadSpawnConfiguration::default().set()?;

    Ok(handle)
}

/// Build everything and start the tasks.
pub fn start(platform: Platform, options: BridgeOptions) -> Result<Bridge, BridgeError> {
    let Platform {
        store,
        radio,
        wifi_flags,
        serial,
        hid,
        clock,
    } = platform;

    let session = SessionState::load(store);
    let config = session.snapshot();
    info!(
        "[bridge] transport {}, baud {}, wifi {}",
        config.transport,
        config.uart_baud,
        config.wifi_ssid().unwrap_or("(none)")
    );
    // Serial starts at the default rate; the coordinator applies the saved one
    session.mark_uart_dirty();

    let outbox = Arc::new(Outbox::new(session.clone(), Arc::new(ClientRegistry::new())));
    let (commands_tx, commands_rx) = command_channel(COMMAND_QUEUE_CAPACITY);

    let controller = WifiStationController::new(
        radio,
        wifi_flags,
        Box::new(CaptivePortalService::with_port(options.dns_port)),
        session.clone(),
        outbox.clone(),
        clock.clone(),
    );
    let ble_fallback_name = controller.ap_settings().ssid.clone();
    let (wifi, wifi_requests) = wifi_channel(controller.status_handle());

    let ws = Arc::new(WebSocketTransport::new(
        commands_tx.clone(),
        outbox.clone(),
        clock.clone(),
    ));
    let router = Arc::new(ApiRouter::new(
        session.clone(),
        Arc::new(wifi),
        outbox.clone(),
    ));
    let http = HttpServer::start(options.http_port, router)?;
    let ws_server = WsServer::start(options.ws_port, ws.clone())?;

    let uart = UartTransport::new(serial, commands_tx, BaudRate::default());
    let coordinator = TransportCoordinator::new(session.clone(), outbox.clone(), uart, ws);

    let ble = BleTask {
        manager: BleSessionManager::new(
            HidDevice::new(hid),
            session.clone(),
            outbox.clone(),
            clock.clone(),
            ble_fallback_name,
        ),
        dispatcher: CommandDispatcher::new(clock.clone()),
        commands: commands_rx,
        outbox: outbox.clone(),
        session: session.clone(),
        clock: clock.clone(),
        retry_at: None,
    };

    let mut tasks = Vec::new();
    tasks.push(spawn_task("wifi", 16 * 1024, TaskCore::Network, move || {
        controller.run(wifi_requests, WIFI_TICK)
    })?);
    let coord_clock = clock.clone();
    tasks.push(spawn_task("coord", 8 * 1024, TaskCore::Network, move || {
        coordinator.run(coord_clock)
    })?);
    let start_delay = options.ble_start_delay;
    tasks.push(spawn_task("ble", 16 * 1024, TaskCore::Ble, move || {
        ble.run(start_delay)
    })?);

    outbox.emit(status::event(events::READY));
    info!("[bridge] ready");

    Ok(Bridge {
        session,
        outbox,
        http,
        ws: ws_server,
        tasks,
    })
}

/// BLE consumer: drains the command channel into the HID device.
pub struct BleTask {
    manager: BleSessionManager,
    dispatcher: CommandDispatcher,
    commands: CommandReceiver,
    outbox: Arc<Outbox>,
    session: Arc<SessionState>,
    clock: Arc<dyn Clock>,
    retry_at: Option<Millis>,
}

impl BleTask {
    pub fn manager(&self) -> &BleSessionManager {
        &self.manager
    }

    /// Bring up the stack, scheduling a retry on failure.
    pub fn start_stack(&mut self) {
        match self.manager.begin() {
            Ok(()) => self.retry_at = None,
            Err(e) => {
                error!("[ble] start failed: {}", e);
                self.outbox.emit(status::warning("BLE start failed"));
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Some(self.clock.now_ms() + BLE_RETRY_INTERVAL.as_millis() as Millis);
    }

    /// One loop iteration. Returns false once every command producer is gone.
    pub fn step(&mut self, timeout: Duration) -> bool {
        if self.manager.state() == BleStackState::Uninitialized {
            if let Some(at) = self.retry_at {
                if deadline_reached(self.clock.now_ms(), at) {
                    self.start_stack();
                }
            }
        }

        if self.session.take_identity_dirty() {
            match self.manager.apply_identity_from_config() {
                Ok(true) => info!("[ble] identity applied"),
                Ok(false) => {}
                Err(e) => {
                    warn!("[ble] identity change failed: {}", e);
                    self.outbox
                        .emit(status::warning("Failed to apply BLE identity"));
                    self.schedule_retry();
                }
            }
        }

        let alive = match self.commands.recv_timeout(timeout) {
            Ok(Some(message)) => {
                if let Some(reply) = self
                    .dispatcher
                    .dispatch(message.as_str(), self.manager.device())
                {
                    self.outbox.reply(message.origin(), reply);
                }
                true
            }
            Ok(None) => true,
            Err(EnqueueError::Closed) => false,
            Err(e) => {
                warn!("[ble] receive failed: {}", e);
                true
            }
        };

        self.manager.poll_connection();
        alive
    }

    /// Task body.
    pub fn run(mut self, start_delay: Duration) {
        self.clock.sleep(start_delay);
        self.start_stack();
        while self.step(BLE_RECV_TIMEOUT) {}
        warn!("[ble] command channel closed, consumer stopping");
    }
}
