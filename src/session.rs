//! Shared device session state.
//!
//! One [`SessionState`] is created at boot and handed (as `Arc`) to every
//! component constructor. It holds the authoritative in-memory
//! [`DeviceConfig`], the store used to persist it, and the dirty flags that
//! tell owning tasks to re-apply UART settings or BLE identity.
//!
//! Readers take a copy through [`SessionState::snapshot`] so the lock is
//! never held across I/O.

use crate::config::{DeviceConfig, TransportMode};
use crate::store::{ConfigStore, StoreError};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

pub struct SessionState {
    config: Mutex<DeviceConfig>,
    store: Mutex<ConfigStore>,
    // Lock-free mirror of config.transport for hot-path readers
    transport: AtomicU8,
    uart_dirty: AtomicBool,
    identity_dirty: AtomicBool,
    ble_connected: AtomicBool,
}

impl SessionState {
    /// Load the configuration from `store` and wrap it for sharing.
    pub fn load(store: ConfigStore) -> Arc<Self> {
        let config = store.load();
        Self::with_config(config, store)
    }

    /// Use an explicit starting configuration instead of loading.
    pub fn with_config(config: DeviceConfig, store: ConfigStore) -> Arc<Self> {
        Arc::new(Self {
            transport: AtomicU8::new(config.transport.to_u8()),
            config: Mutex::new(config),
            store: Mutex::new(store),
            uart_dirty: AtomicBool::new(false),
            identity_dirty: AtomicBool::new(false),
            ble_connected: AtomicBool::new(false),
        })
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> DeviceConfig {
        self.config.lock().unwrap().clone()
    }

    /// Currently selected transport.
    pub fn transport(&self) -> TransportMode {
        TransportMode::from_u8(self.transport.load(Ordering::Acquire))
    }

    /// Mutate the in-memory configuration.
    ///
    /// Does not persist; follow with [`persist`](Self::persist) for
    /// anything that must survive a reboot.
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceConfig) -> R) -> R {
        let mut config = self.config.lock().unwrap();
        let result = f(&mut config);
        self.transport
            .store(config.transport.to_u8(), Ordering::Release);
        result
    }

    /// Run a persist operation against the store.
    ///
    /// Receives a copy of the current configuration so the config lock is
    /// not held during the (possibly slow) flash write.
    pub fn persist(
        &self,
        f: impl FnOnce(&mut ConfigStore, &DeviceConfig) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let config = self.snapshot();
        let mut store = self.store.lock().unwrap();
        f(&mut store, &config)
    }

    pub fn mark_uart_dirty(&self) {
        self.uart_dirty.store(true, Ordering::Release);
    }

    /// Consume the UART-settings-changed flag.
    pub fn take_uart_dirty(&self) -> bool {
        self.uart_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn mark_identity_dirty(&self) {
        self.identity_dirty.store(true, Ordering::Release);
    }

    /// Consume the BLE-identity-changed flag.
    pub fn take_identity_dirty(&self) -> bool {
        self.identity_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn set_ble_connected(&self, connected: bool) {
        self.ble_connected.store(connected, Ordering::Release);
    }

    pub fn ble_connected(&self) -> bool {
        self.ble_connected.load(Ordering::Acquire)
    }
}
