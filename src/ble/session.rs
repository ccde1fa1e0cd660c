//! BLE stack lifecycle.
//!
//! The advertised name and manufacturer can only change by tearing the
//! stack down and starting it again, so identity changes go through a
//! single restart sequence:
//!
//! ```text
//! Uninitialized --begin--> Active --reconfigure--> Restarting --> Active
//! ```
//!
//! A central connected before a restart sees `ble_disconnected` first and,
//! if it comes back, `ble_connected` after; the name never changes under a
//! session that still looks connected.

use super::hid::{BleIdentity, HidDevice, HidError};
use crate::clock::Clock;
use crate::outbound::EventSink;
use crate::session::SessionState;
use crate::status::{self, events};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Pause between stop, deinit and restart.
pub const RESTART_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleStackState {
    Uninitialized,
    Active,
    Restarting,
}

pub struct BleSessionManager {
    device: HidDevice,
    session: Arc<SessionState>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    fallback_name: String,
    default_manufacturer: Option<String>,
    identity: Option<BleIdentity>,
    state: BleStackState,
    last_connected: bool,
}

impl BleSessionManager {
    /// `fallback_name` is advertised while no name override is configured.
    pub fn new(
        device: HidDevice,
        session: Arc<SessionState>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        fallback_name: impl Into<String>,
    ) -> Self {
        Self {
            device,
            session,
            events,
            clock,
            fallback_name: fallback_name.into(),
            default_manufacturer: None,
            identity: None,
            state: BleStackState::Uninitialized,
            last_connected: false,
        }
    }

    pub fn state(&self) -> BleStackState {
        self.state
    }

    /// Identity in use, or staged for the next start.
    pub fn identity(&self) -> Option<&BleIdentity> {
        self.identity.as_ref()
    }

    pub fn device(&mut self) -> &mut HidDevice {
        &mut self.device
    }

    pub fn is_connected(&self) -> bool {
        self.state == BleStackState::Active && self.device.is_connected()
    }

    /// Start the stack under the configured identity. No-op when active.
    pub fn begin(&mut self) -> Result<(), HidError> {
        if self.state == BleStackState::Active {
            return Ok(());
        }
        if self.default_manufacturer.is_none() {
            self.default_manufacturer = Some(self.device.backend().default_manufacturer());
        }

        let identity = self.desired_identity();
        self.identity = Some(identity.clone());
        self.device.backend_mut().start(&identity)?;
        self.device.reset();
        self.state = BleStackState::Active;
        self.last_connected = self.device.is_connected();
        self.session.set_ble_connected(self.last_connected);
        info!(
            "[ble] started as '{}' ({})",
            identity.name, identity.manufacturer
        );
        Ok(())
    }

    /// Identity the configuration asks for right now.
    pub fn desired_identity(&self) -> BleIdentity {
        let config = self.session.snapshot();
        let name = config
            .ble_device_name
            .unwrap_or_else(|| self.fallback_name.clone());
        let manufacturer = config
            .ble_manufacturer_name
            .or_else(|| self.default_manufacturer.clone())
            .unwrap_or_else(|| self.device.backend().default_manufacturer());
        BleIdentity { name, manufacturer }
    }

    /// Bring the advertised identity in line with the configuration.
    ///
    /// Before [`begin`](Self::begin) this only stages the identity. While
    /// active it restarts the stack if the name or manufacturer changed.
    /// Returns true if a restart happened.
    pub fn apply_identity_from_config(&mut self) -> Result<bool, HidError> {
        let desired = self.desired_identity();
        if self.state != BleStackState::Active {
            self.identity = Some(desired);
            return Ok(false);
        }
        if self.identity.as_ref() == Some(&desired) {
            return Ok(false);
        }
        self.restart(desired)?;
        Ok(true)
    }

    fn restart(&mut self, identity: BleIdentity) -> Result<(), HidError> {
        let was_connected = self.device.is_connected();
        self.state = BleStackState::Restarting;
        info!(
            "[ble] restarting as '{}' ({})",
            identity.name, identity.manufacturer
        );

        if let Err(e) = self.device.backend_mut().stop() {
            warn!("[ble] stop failed: {}", e);
        }
        self.clock.sleep(RESTART_SETTLE);
        if let Err(e) = self.device.backend_mut().deinit() {
            warn!("[ble] deinit failed: {}", e);
        }
        self.clock.sleep(RESTART_SETTLE);

        self.identity = Some(identity.clone());
        self.device.reset();

        if was_connected {
            self.last_connected = false;
            self.session.set_ble_connected(false);
            self.events.emit(status::event(events::BLE_DISCONNECTED));
        }

        if let Err(e) = self.device.backend_mut().start(&identity) {
            self.state = BleStackState::Uninitialized;
            self.last_connected = false;
            self.session.set_ble_connected(false);
            return Err(e);
        }
        self.state = BleStackState::Active;
        self.clock.sleep(RESTART_SETTLE);

        let connected = self.device.is_connected();
        if connected != self.last_connected {
            self.last_connected = connected;
            self.session.set_ble_connected(connected);
            if connected {
                self.events.emit(status::event(events::BLE_CONNECTED));
            }
        }
        Ok(())
    }

    /// Emit one event per connect/disconnect edge.
    ///
    /// Returns the new state when an edge was seen.
    pub fn poll_connection(&mut self) -> Option<bool> {
        if self.state != BleStackState::Active {
            return None;
        }
        let connected = self.device.is_connected();
        if connected == self.last_connected {
            return None;
        }
        self.last_connected = connected;
        self.session.set_ble_connected(connected);
        let name = if connected {
            events::BLE_CONNECTED
        } else {
            events::BLE_DISCONNECTED
        };
        info!("[ble] {}", name);
        self.events.emit(status::event(name));
        Some(connected)
    }
}
