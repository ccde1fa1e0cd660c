//! Host HID backend.
//!
//! Logs every report instead of sending it and records the calls so tests
//! can inspect them. A simulated central can be attached with
//! [`LoggingHid::set_connected`]; with auto-connect on, it reattaches after
//! every restart the way a bonded host does.

use super::hid::{BleIdentity, HidBackend, HidError, KeyboardReport, MouseReport};
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// Manufacturer reported when no override is configured.
pub const SIM_MANUFACTURER: &str = "Espressif";

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidCall {
    Start(BleIdentity),
    Stop,
    Deinit,
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    Media(u16),
}

#[derive(Debug, Default)]
struct SimHid {
    running: bool,
    connected: bool,
    auto_connect: bool,
    fail_start: bool,
    calls: Vec<HidCall>,
}

/// Clones share state.
#[derive(Clone, Default)]
pub struct LoggingHid {
    state: Arc<Mutex<SimHid>>,
}

impl LoggingHid {
    pub fn new() -> Self {
        Self::default()
    }

    /// A central that connects as soon as the stack starts.
    pub fn auto_connecting() -> Self {
        let hid = Self::new();
        hid.state.lock().unwrap().auto_connect = true;
        hid
    }

    /// Attach or detach the simulated central. Ignored while stopped.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock().unwrap();
        state.connected = connected && state.running;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub fn take_calls(&self) -> Vec<HidCall> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    /// Number of times the stack was started.
    pub fn starts(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matches!(c, HidCall::Start(_)))
            .count()
    }

    fn record(&self, call: HidCall) -> Result<(), HidError> {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Err(HidError::NotStarted);
        }
        debug!("[ble] sim {:?}", call);
        state.calls.push(call);
        Ok(())
    }
}

impl HidBackend for LoggingHid {
    fn start(&mut self, identity: &BleIdentity) -> Result<(), HidError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(HidError::Init("simulated failure".into()));
        }
        info!(
            "[ble] sim advertising as '{}' ({})",
            identity.name, identity.manufacturer
        );
        state.running = true;
        state.connected = state.auto_connect;
        state.calls.push(HidCall::Start(identity.clone()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HidError> {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.connected = false;
        state.calls.push(HidCall::Stop);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), HidError> {
        self.state.lock().unwrap().calls.push(HidCall::Deinit);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn default_manufacturer(&self) -> String {
        SIM_MANUFACTURER.to_string()
    }

    fn send_keyboard(&mut self, report: &KeyboardReport) -> Result<(), HidError> {
        self.record(HidCall::Keyboard(*report))
    }

    fn send_mouse(&mut self, report: &MouseReport) -> Result<(), HidError> {
        self.record(HidCall::Mouse(*report))
    }

    fn send_media(&mut self, keys: u16) -> Result<(), HidError> {
        self.record(HidCall::Media(keys))
    }
}
