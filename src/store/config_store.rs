//! Mapping between [`DeviceConfig`] and the key/value store.

use super::{KeyValueStore, StoreError};
use crate::config::{BaudRate, DeviceConfig, TransportMode, WifiCredentials};
use log::{info, warn};

/// Namespaces and key names. NVS keys are limited to 15 bytes.
pub mod keys {
    pub const DEVICE_NAMESPACE: &str = "device";
    pub const WIFI_NAMESPACE: &str = "wifi";

    pub const TRANSPORT: &str = "transport";
    pub const BAUD: &str = "baud";
    pub const BLE_NAME: &str = "ble_name";
    pub const BLE_MANUFACTURER: &str = "ble_mfr";

    pub const SSID: &str = "ssid";
    pub const PASSWORD: &str = "password";
}

use keys::*;

/// Typed access to the persisted [`DeviceConfig`].
pub struct ConfigStore {
    backend: Box<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Load the configuration, falling back to defaults field by field.
    ///
    /// Never fails: unreadable values are logged and replaced, unknown
    /// transport bytes become [`TransportMode::Uart`] and unsupported baud
    /// rates become the default.
    pub fn load(&self) -> DeviceConfig {
        let mut config = DeviceConfig::default();

        if let Some(raw) = self.read(DEVICE_NAMESPACE, TRANSPORT, |b, ns, k| b.get_u8(ns, k)) {
            config.transport = TransportMode::from_u8(raw);
            if config.transport.to_u8() != raw {
                warn!("[store] unknown transport byte {}, using {}", raw, config.transport);
            }
        }

        if let Some(raw) = self.read(DEVICE_NAMESPACE, BAUD, |b, ns, k| b.get_u32(ns, k)) {
            config.uart_baud = BaudRate::sanitize(raw);
            if config.uart_baud.get() != raw {
                warn!("[store] unsupported stored baud {}, using {}", raw, config.uart_baud);
            }
        }

        let ssid = self.read(WIFI_NAMESPACE, SSID, |b, ns, k| b.get_str(ns, k));
        let password = self.read(WIFI_NAMESPACE, PASSWORD, |b, ns, k| b.get_str(ns, k));
        if let Some(ssid) = ssid.filter(|s| !s.is_empty()) {
            config.wifi = Some(WifiCredentials::unchecked(ssid, password.unwrap_or_default()));
        }

        config.ble_device_name = self
            .read(DEVICE_NAMESPACE, BLE_NAME, |b, ns, k| b.get_str(ns, k))
            .filter(|s| !s.is_empty());
        config.ble_manufacturer_name = self
            .read(DEVICE_NAMESPACE, BLE_MANUFACTURER, |b, ns, k| b.get_str(ns, k))
            .filter(|s| !s.is_empty());

        info!(
            "[store] loaded config: transport={} baud={} wifi={}",
            config.transport,
            config.uart_baud,
            config.wifi_ssid().unwrap_or("<none>")
        );
        config
    }

    fn read<T>(
        &self,
        namespace: &str,
        key: &str,
        get: impl Fn(&dyn KeyValueStore, &str, &str) -> Result<Option<T>, StoreError>,
    ) -> Option<T> {
        match get(self.backend.as_ref(), namespace, key) {
            Ok(value) => value,
            Err(e) => {
                warn!("[store] failed to read {}/{}: {}", namespace, key, e);
                None
            }
        }
    }

    /// Persist every field.
    pub fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        self.save_transport(config.transport)?;
        self.save_baud(config.uart_baud)?;
        self.save_wifi(config.wifi.as_ref())?;
        self.save_ble_identity(
            config.ble_device_name.as_deref(),
            config.ble_manufacturer_name.as_deref(),
        )
    }

    pub fn save_transport(&mut self, mode: TransportMode) -> Result<(), StoreError> {
        self.backend
            .set_u8(DEVICE_NAMESPACE, TRANSPORT, mode.to_u8())
    }

    pub fn save_baud(&mut self, baud: BaudRate) -> Result<(), StoreError> {
        self.backend.set_u32(DEVICE_NAMESPACE, BAUD, baud.get())
    }

    /// Store credentials, or erase them when `None` or the SSID is empty.
    pub fn save_wifi(&mut self, creds: Option<&WifiCredentials>) -> Result<(), StoreError> {
        match creds.filter(|c| !c.ssid.is_empty()) {
            Some(creds) => {
                self.backend.set_str(WIFI_NAMESPACE, SSID, &creds.ssid)?;
                self.backend
                    .set_str(WIFI_NAMESPACE, PASSWORD, &creds.password)
            }
            None => {
                self.backend.remove(WIFI_NAMESPACE, SSID)?;
                self.backend.remove(WIFI_NAMESPACE, PASSWORD)
            }
        }
    }

    /// Store identity overrides; `None` removes the key.
    pub fn save_ble_identity(
        &mut self,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> Result<(), StoreError> {
        self.save_optional_str(DEVICE_NAMESPACE, BLE_NAME, name)?;
        self.save_optional_str(DEVICE_NAMESPACE, BLE_MANUFACTURER, manufacturer)
    }

    fn save_optional_str(
        &mut self,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), StoreError> {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => self.backend.set_str(namespace, key, v),
            None => self.backend.remove(namespace, key),
        }
    }
}
