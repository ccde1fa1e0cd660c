//! BLE HID bridge firmware.
//!
//! On ESP32 (`--features esp32`) this drives the real UART0, WiFi radio and
//! NimBLE stack. On the host it runs the same tasks against stdin/stdout, a
//! simulated radio and a logging HID backend, which is handy for poking the
//! HTTP and WebSocket surfaces:
//!
//! ```bash
//! cargo run --bin bridge
//! echo '{"device":"keyboard","action":"write","text":"hi"}' | cargo run --bin bridge
//! ```

#[cfg(feature = "esp32")]
use esp_idf_svc::sys as _;

use ble_hid_bridge::runtime::{self, BridgeError, BridgeOptions, Platform};
use log::{error, info};
use std::time::Duration;

fn platform_init() {
    #[cfg(feature = "esp32")]
    {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    #[cfg(not(feature = "esp32"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn platform() -> Result<Platform, BridgeError> {
    use ble_hid_bridge::ble::NimbleHid;
    use ble_hid_bridge::clock::SystemClock;
    use ble_hid_bridge::config::BaudRate;
    use ble_hid_bridge::store::{nvs_default_partition, ConfigStore, NvsStore};
    use ble_hid_bridge::uart::EspSerialPort;
    use ble_hid_bridge::wifi::{EspWifiRadio, WifiEventFlags, DEFAULT_AP_IP};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use std::sync::Arc;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = nvs_default_partition()?;

    let serial = EspSerialPort::new(
        peripherals.uart0,
        peripherals.pins.gpio1,
        peripherals.pins.gpio3,
        BaudRate::default(),
    )?;

    let wifi_flags = Arc::new(WifiEventFlags::new());
    let radio = EspWifiRadio::new(
        peripherals.modem,
        sysloop,
        Some(nvs.clone()),
        DEFAULT_AP_IP,
        wifi_flags.clone(),
    )?;

    Ok(Platform {
        store: ConfigStore::new(NvsStore::new(nvs)),
        radio: Box::new(radio),
        wifi_flags,
        serial: Box::new(serial),
        hid: Box::new(NimbleHid::new()),
        clock: Arc::new(SystemClock::new()),
    })
}

#[cfg(not(feature = "esp32"))]
fn platform() -> Result<Platform, BridgeError> {
    use ble_hid_bridge::ble::LoggingHid;
    use ble_hid_bridge::clock::SystemClock;
    use ble_hid_bridge::store::{ConfigStore, FileStore};
    use ble_hid_bridge::uart::StdioSerial;
    use ble_hid_bridge::wifi::{SimulatedRadio, WifiEventFlags};
    use std::sync::Arc;

    let store = FileStore::open_default()?;
    info!("[bridge] config in {}", store.dir().display());
    let wifi_flags = Arc::new(WifiEventFlags::new());

    Ok(Platform {
        store: ConfigStore::new(store),
        radio: Box::new(SimulatedRadio::with_demo_networks(wifi_flags.clone())),
        wifi_flags,
        serial: Box::new(StdioSerial::new()?),
        hid: Box::new(LoggingHid::auto_connecting()),
        clock: Arc::new(SystemClock::new()),
    })
}

#[cfg(not(feature = "esp32"))]
fn options() -> BridgeOptions {
    // Unprivileged ports; 53/80/81 need root on a desktop
    BridgeOptions {
        http_port: 8080,
        ws_port: 8081,
        dns_port: 8053,
        ..BridgeOptions::default()
    }
}

#[cfg(feature = "esp32")]
fn options() -> BridgeOptions {
    BridgeOptions::default()
}

fn halt() -> ! {
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

fn main() {
    platform_init();
    info!("=== BLE HID bridge starting ===");

    let bridge = match platform().and_then(|p| runtime::start(p, options())) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("[bridge] startup failed: {}", e);
            halt();
        }
    };
    info!(
        "[bridge] HTTP on {}, WebSocket on {}",
        bridge.http_port(),
        bridge.ws_port()
    );

    bridge.wait();
    error!("[bridge] all tasks exited");
    halt();
}
