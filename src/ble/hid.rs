//! HID reports and the backend seam.
//!
//! [`HidBackend`] is the part that talks to a BLE stack: start/stop
//! advertising under an identity and notify raw reports. [`HidDevice`]
//! sits on top and keeps the keyboard and mouse report state, so press and
//! release behave like a physical keyboard (a key stays down until
//! released, modifiers accumulate).

use super::keys::{self, KeyAction};
use std::fmt;

/// Slots in the keyboard report key array.
pub const KEY_ROLLOVER: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidError {
    /// The BLE stack failed to come up.
    Init(String),
    /// Operation needs a running stack.
    NotStarted,
    /// A report could not be delivered.
    Notify(String),
}

impl fmt::Display for HidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(msg) => write!(f, "BLE init failed: {}", msg),
            Self::NotStarted => write!(f, "BLE stack not started"),
            Self::Notify(msg) => write!(f, "HID report failed: {}", msg),
        }
    }
}

impl std::error::Error for HidError {}

/// Advertised name and Device Information manufacturer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleIdentity {
    pub name: String,
    pub manufacturer: String,
}

/// Boot-protocol style keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keys: [u8; KEY_ROLLOVER],
}

impl KeyboardReport {
    /// Wire layout: modifiers, reserved, six usages.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = self.modifiers;
        out[2..].copy_from_slice(&self.keys);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
    pub pan: i8,
}

impl MouseReport {
    pub fn to_bytes(&self) -> [u8; 5] {
        [
            self.buttons,
            self.x as u8,
            self.y as u8,
            self.wheel as u8,
            self.pan as u8,
        ]
    }
}

/// The BLE stack underneath the HID device.
pub trait HidBackend: Send {
    /// Bring up the stack and advertise as `identity`.
    fn start(&mut self, identity: &BleIdentity) -> Result<(), HidError>;

    /// Stop advertising and drop the HID service.
    fn stop(&mut self) -> Result<(), HidError>;

    /// Release the BLE controller entirely.
    fn deinit(&mut self) -> Result<(), HidError>;

    /// A central is connected.
    fn is_connected(&self) -> bool;

    /// Manufacturer string the stack reports when none is configured.
    fn default_manufacturer(&self) -> String;

    fn send_keyboard(&mut self, report: &KeyboardReport) -> Result<(), HidError>;

    fn send_mouse(&mut self, report: &MouseReport) -> Result<(), HidError>;

    /// Consumer-control bitmask, 0 releases everything.
    fn send_media(&mut self, keys: u16) -> Result<(), HidError>;
}

/// Relative mouse motion. Values beyond ±127 are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Motion {
    pub x: i32,
    pub y: i32,
    pub wheel: i32,
    pub pan: i32,
}

impl Motion {
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.wheel == 0 && self.pan == 0
    }
}

fn clamp_axis(v: i32) -> i8 {
    v.clamp(-127, 127) as i8
}

/// Keyboard, mouse and consumer-control device over a [`HidBackend`].
pub struct HidDevice {
    backend: Box<dyn HidBackend>,
    keyboard: KeyboardReport,
    mouse_buttons: u8,
}

impl HidDevice {
    pub fn new(backend: Box<dyn HidBackend>) -> Self {
        Self {
            backend,
            keyboard: KeyboardReport::default(),
            mouse_buttons: 0,
        }
    }

    pub fn backend(&self) -> &dyn HidBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn HidBackend {
        self.backend.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Forget held keys and buttons without sending anything.
    pub fn reset(&mut self) {
        self.keyboard = KeyboardReport::default();
        self.mouse_buttons = 0;
    }

    /// Current keyboard report.
    pub fn keyboard_report(&self) -> KeyboardReport {
        self.keyboard
    }

    /// Hold a key down. Returns `Ok(false)` if the code has no key.
    pub fn press(&mut self, code: u8) -> Result<bool, HidError> {
        match keys::decode(code) {
            None => Ok(false),
            Some(KeyAction::Modifier(bit)) => {
                self.keyboard.modifiers |= bit;
                self.send_keyboard().map(|()| true)
            }
            Some(KeyAction::Usage { usage, shift }) => {
                if shift {
                    self.keyboard.modifiers |= 0x02;
                }
                if !self.keyboard.keys.contains(&usage) {
                    // Report rolls over silently when all slots are taken
                    if let Some(slot) = self.keyboard.keys.iter_mut().find(|k| **k == 0) {
                        *slot = usage;
                    }
                }
                self.send_keyboard().map(|()| true)
            }
        }
    }

    /// Let a key go. Returns `Ok(false)` if the code has no key.
    pub fn release(&mut self, code: u8) -> Result<bool, HidError> {
        match keys::decode(code) {
            None => Ok(false),
            Some(KeyAction::Modifier(bit)) => {
                self.keyboard.modifiers &= !bit;
                self.send_keyboard().map(|()| true)
            }
            Some(KeyAction::Usage { usage, shift }) => {
                if shift {
                    self.keyboard.modifiers &= !0x02;
                }
                for slot in self.keyboard.keys.iter_mut().filter(|k| **k == usage) {
                    *slot = 0;
                }
                self.send_keyboard().map(|()| true)
            }
        }
    }

    /// Press and release.
    pub fn write(&mut self, code: u8) -> Result<bool, HidError> {
        if !self.press(code)? {
            return Ok(false);
        }
        self.release(code)
    }

    pub fn release_all(&mut self) -> Result<(), HidError> {
        self.keyboard = KeyboardReport::default();
        self.send_keyboard()
    }

    /// Tap a set of consumer-control keys.
    pub fn write_media(&mut self, keys: u16) -> Result<(), HidError> {
        self.backend.send_media(keys)?;
        self.backend.send_media(0)
    }

    pub fn mouse_press(&mut self, buttons: u8) -> Result<(), HidError> {
        self.mouse_buttons |= buttons;
        self.send_mouse(Motion::default())
    }

    pub fn mouse_release(&mut self, buttons: u8) -> Result<(), HidError> {
        self.mouse_buttons &= !buttons;
        self.send_mouse(Motion::default())
    }

    pub fn mouse_buttons(&self) -> u8 {
        self.mouse_buttons
    }

    pub fn mouse_move(&mut self, motion: Motion) -> Result<(), HidError> {
        self.send_mouse(motion)
    }

    fn send_keyboard(&mut self) -> Result<(), HidError> {
        self.backend.send_keyboard(&self.keyboard)
    }

    fn send_mouse(&mut self, motion: Motion) -> Result<(), HidError> {
        self.backend.send_mouse(&MouseReport {
            buttons: self.mouse_buttons,
            x: clamp_axis(motion.x),
            y: clamp_axis(motion.y),
            wheel: clamp_axis(motion.wheel),
            pan: clamp_axis(motion.pan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::keys::{mouse, KEY_LEFT_CTRL, KEY_RETURN};
    use crate::ble::{HidCall, LoggingHid};

    fn device() -> (HidDevice, LoggingHid) {
        let mut hid = LoggingHid::new();
        hid.start(&BleIdentity {
            name: "test".into(),
            manufacturer: "test".into(),
        })
        .unwrap();
        hid.take_calls();
        (HidDevice::new(Box::new(hid.clone())), hid)
    }

    fn keyboard_reports(hid: &LoggingHid) -> Vec<KeyboardReport> {
        hid.take_calls()
            .into_iter()
            .filter_map(|c| match c {
                HidCall::Keyboard(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    // ==================== Keyboard Tests ====================

    #[test]
    fn test_write_uppercase_sends_shift() {
        let (mut dev, hid) = device();
        assert!(dev.write(b'A').unwrap());

        let reports = keyboard_reports(&hid);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].modifiers, 0x02);
        assert_eq!(reports[0].keys[0], 0x04);
        assert_eq!(reports[1], KeyboardReport::default());
    }

    #[test]
    fn test_combo_accumulates_until_released() {
        let (mut dev, hid) = device();
        dev.press(KEY_LEFT_CTRL).unwrap();
        dev.press(b'c').unwrap();
        assert_eq!(dev.keyboard_report().modifiers, 0x01);
        assert_eq!(dev.keyboard_report().keys[0], 0x06);

        dev.release(b'c').unwrap();
        assert_eq!(dev.keyboard_report().modifiers, 0x01);
        dev.release_all().unwrap();
        assert_eq!(dev.keyboard_report(), KeyboardReport::default());
        assert_eq!(keyboard_reports(&hid).len(), 4);
    }

    #[test]
    fn test_same_key_occupies_one_slot() {
        let (mut dev, _hid) = device();
        dev.press(KEY_RETURN).unwrap();
        dev.press(KEY_RETURN).unwrap();
        let report = dev.keyboard_report();
        assert_eq!(report.keys.iter().filter(|k| **k == 0x28).count(), 1);
    }

    #[test]
    fn test_rollover_ignores_seventh_key() {
        let (mut dev, _hid) = device();
        for c in b"abcdefg" {
            dev.press(*c).unwrap();
        }
        assert_eq!(dev.keyboard_report().keys, [0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
    }

    #[test]
    fn test_unmapped_code_sends_nothing() {
        let (mut dev, hid) = device();
        assert!(!dev.write(b'\r').unwrap());
        assert!(hid.take_calls().is_empty());
    }

    #[test]
    fn test_report_bytes() {
        let report = KeyboardReport {
            modifiers: 0x02,
            keys: [0x04, 0, 0, 0, 0, 0],
        };
        assert_eq!(report.to_bytes(), [0x02, 0, 0x04, 0, 0, 0, 0, 0]);
    }

    // ==================== Mouse Tests ====================

    #[test]
    fn test_mouse_buttons_persist_across_moves() {
        let (mut dev, hid) = device();
        dev.mouse_press(mouse::LEFT).unwrap();
        dev.mouse_move(Motion {
            x: 500,
            y: -3,
            ..Default::default()
        })
        .unwrap();
        dev.mouse_release(mouse::LEFT).unwrap();

        let calls = hid.take_calls();
        assert_eq!(
            calls[1],
            HidCall::Mouse(MouseReport {
                buttons: mouse::LEFT,
                x: 127,
                y: -3,
                wheel: 0,
                pan: 0
            })
        );
        assert_eq!(calls[2], HidCall::Mouse(MouseReport::default()));
    }

    #[test]
    fn test_media_tap_releases() {
        let (mut dev, hid) = device();
        dev.write_media(crate::ble::keys::media::MUTE).unwrap();
        assert_eq!(
            hid.take_calls(),
            vec![HidCall::Media(crate::ble::keys::media::MUTE), HidCall::Media(0)]
        );
    }
}
