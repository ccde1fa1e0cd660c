//! NimBLE HID backend for ESP32.
//!
//! One composite HID service with three input reports: keyboard (id 1,
//! plus the LED output report), consumer control (id 2) and mouse (id 3).

use super::hid::{BleIdentity, HidBackend, HidError, KeyboardReport, MouseReport};
use esp32_nimble::enums::{AuthReq, SecurityIOCap};
use esp32_nimble::utilities::mutex::Mutex;
use esp32_nimble::{BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEHIDDevice};
use log::{info, warn};
use std::sync::Arc;

const KEYBOARD_ID: u8 = 0x01;
const MEDIA_KEYS_ID: u8 = 0x02;
const MOUSE_ID: u8 = 0x03;

/// Generic HID appearance (keyboard).
const APPEARANCE_KEYBOARD: u16 = 0x03C1;

const DEFAULT_MANUFACTURER: &str = "Espressif";

#[rustfmt::skip]
const REPORT_MAP: &[u8] = &[
    // Keyboard
    0x05, 0x01,       // Usage Page (Generic Desktop)
    0x09, 0x06,       // Usage (Keyboard)
    0xA1, 0x01,       // Collection (Application)
    0x85, KEYBOARD_ID, //  Report ID
    0x05, 0x07,       //  Usage Page (Key Codes)
    0x19, 0xE0,       //  Usage Minimum (224)
    0x29, 0xE7,       //  Usage Maximum (231)
    0x15, 0x00,       //  Logical Minimum (0)
    0x25, 0x01,       //  Logical Maximum (1)
    0x75, 0x01,       //  Report Size (1)
    0x95, 0x08,       //  Report Count (8)
    0x81, 0x02,       //  Input (Data, Variable, Absolute) modifiers
    0x95, 0x01,       //  Report Count (1)
    0x75, 0x08,       //  Report Size (8)
    0x81, 0x01,       //  Input (Constant) reserved
    0x95, 0x05,       //  Report Count (5)
    0x75, 0x01,       //  Report Size (1)
    0x05, 0x08,       //  Usage Page (LEDs)
    0x19, 0x01,       //  Usage Minimum (1)
    0x29, 0x05,       //  Usage Maximum (5)
    0x91, 0x02,       //  Output (Data, Variable, Absolute) LEDs
    0x95, 0x01,       //  Report Count (1)
    0x75, 0x03,       //  Report Size (3)
    0x91, 0x01,       //  Output (Constant) padding
    0x95, 0x06,       //  Report Count (6)
    0x75, 0x08,       //  Report Size (8)
    0x15, 0x00,       //  Logical Minimum (0)
    0x25, 0x65,       //  Logical Maximum (101)
    0x05, 0x07,       //  Usage Page (Key Codes)
    0x19, 0x00,       //  Usage Minimum (0)
    0x29, 0x65,       //  Usage Maximum (101)
    0x81, 0x00,       //  Input (Data, Array) keys
    0xC0,             // End Collection
    // Consumer control
    0x05, 0x0C,       // Usage Page (Consumer)
    0x09, 0x01,       // Usage (Consumer Control)
    0xA1, 0x01,       // Collection (Application)
    0x85, MEDIA_KEYS_ID, // Report ID
    0x15, 0x00,       //  Logical Minimum (0)
    0x25, 0x01,       //  Logical Maximum (1)
    0x75, 0x01,       //  Report Size (1)
    0x95, 0x10,       //  Report Count (16)
    0x09, 0xB5,       //  Usage (Scan Next Track)
    0x09, 0xB6,       //  Usage (Scan Previous Track)
    0x09, 0xB7,       //  Usage (Stop)
    0x09, 0xCD,       //  Usage (Play/Pause)
    0x09, 0xE2,       //  Usage (Mute)
    0x09, 0xE9,       //  Usage (Volume Increment)
    0x09, 0xEA,       //  Usage (Volume Decrement)
    0x0A, 0x23, 0x02, //  Usage (WWW Home)
    0x0A, 0x94, 0x01, //  Usage (My Computer)
    0x0A, 0x92, 0x01, //  Usage (Calculator)
    0x0A, 0x2A, 0x02, //  Usage (WWW Favorites)
    0x0A, 0x21, 0x02, //  Usage (WWW Search)
    0x0A, 0x26, 0x02, //  Usage (WWW Stop)
    0x0A, 0x24, 0x02, //  Usage (WWW Back)
    0x0A, 0x83, 0x01, //  Usage (Media Select)
    0x0A, 0x8A, 0x01, //  Usage (Mail)
    0x81, 0x02,       //  Input (Data, Variable, Absolute)
    0xC0,             // End Collection
    // Mouse
    0x05, 0x01,       // Usage Page (Generic Desktop)
    0x09, 0x02,       // Usage (Mouse)
    0xA1, 0x01,       // Collection (Application)
    0x85, MOUSE_ID,   //  Report ID
    0x09, 0x01,       //  Usage (Pointer)
    0xA1, 0x00,       //  Collection (Physical)
    0x05, 0x09,       //   Usage Page (Buttons)
    0x19, 0x01,       //   Usage Minimum (1)
    0x29, 0x05,       //   Usage Maximum (5)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x01,       //   Logical Maximum (1)
    0x95, 0x05,       //   Report Count (5)
    0x75, 0x01,       //   Report Size (1)
    0x81, 0x02,       //   Input (Data, Variable, Absolute) buttons
    0x95, 0x01,       //   Report Count (1)
    0x75, 0x03,       //   Report Size (3)
    0x81, 0x03,       //   Input (Constant) padding
    0x05, 0x01,       //   Usage Page (Generic Desktop)
    0x09, 0x30,       //   Usage (X)
    0x09, 0x31,       //   Usage (Y)
    0x09, 0x38,       //   Usage (Wheel)
    0x15, 0x81,       //   Logical Minimum (-127)
    0x25, 0x7F,       //   Logical Maximum (127)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x03,       //   Report Count (3)
    0x81, 0x06,       //   Input (Data, Variable, Relative)
    0x05, 0x0C,       //   Usage Page (Consumer)
    0x0A, 0x38, 0x02, //   Usage (AC Pan)
    0x15, 0x81,       //   Logical Minimum (-127)
    0x25, 0x7F,       //   Logical Maximum (127)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x01,       //   Report Count (1)
    0x81, 0x06,       //   Input (Data, Variable, Relative)
    0xC0,             //  End Collection
    0xC0,             // End Collection
];

struct Reports {
    keyboard: Arc<Mutex<BLECharacteristic>>,
    media: Arc<Mutex<BLECharacteristic>>,
    mouse: Arc<Mutex<BLECharacteristic>>,
}

/// HID over GATT on the ESP32 NimBLE host.
pub struct NimbleHid {
    reports: Option<Reports>,
}

impl NimbleHid {
    pub fn new() -> Self {
        Self { reports: None }
    }

    fn reports(&self) -> Result<&Reports, HidError> {
        self.reports.as_ref().ok_or(HidError::NotStarted)
    }
}

impl Default for NimbleHid {
    fn default() -> Self {
        Self::new()
    }
}

fn init_err(e: impl core::fmt::Debug) -> HidError {
    HidError::Init(format!("{:?}", e))
}

fn notify(characteristic: &Arc<Mutex<BLECharacteristic>>, data: &[u8]) {
    characteristic.lock().set_value(data).notify();
}

impl HidBackend for NimbleHid {
    fn start(&mut self, identity: &BleIdentity) -> Result<(), HidError> {
        let device = BLEDevice::take();
        BLEDevice::set_device_name(&identity.name).map_err(init_err)?;
        device
            .security()
            .set_auth(AuthReq::all())
            .set_io_cap(SecurityIOCap::NoInputNoOutput)
            .resolve_rpa();

        let server = device.get_server();
        server.advertise_on_disconnect(true);
        server.on_connect(|_server, desc| {
            info!("[ble] central connected: {:?}", desc.address());
        });
        server.on_disconnect(|_desc, reason| {
            info!("[ble] central disconnected: {:?}", reason);
        });

        let mut hid = BLEHIDDevice::new(server);
        let keyboard = hid.input_report(KEYBOARD_ID);
        let _leds = hid.output_report(KEYBOARD_ID);
        let media = hid.input_report(MEDIA_KEYS_ID);
        let mouse = hid.input_report(MOUSE_ID);

        hid.manufacturer(&identity.manufacturer);
        hid.pnp(0x02, 0x05ac, 0x820a, 0x0210);
        hid.hid_info(0x00, 0x01);
        hid.report_map(REPORT_MAP);
        hid.set_battery_level(100);

        let advertising = device.get_advertising();
        advertising
            .lock()
            .scan_response(false)
            .set_data(
                BLEAdvertisementData::new()
                    .name(&identity.name)
                    .appearance(APPEARANCE_KEYBOARD)
                    .add_service_uuid(hid.hid_service().lock().uuid()),
            )
            .map_err(init_err)?;
        advertising.lock().start().map_err(init_err)?;

        self.reports = Some(Reports {
            keyboard,
            media,
            mouse,
        });
        info!("[ble] advertising as '{}'", identity.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HidError> {
        self.reports = None;
        let device = BLEDevice::take();
        if let Err(e) = device.get_advertising().lock().stop() {
            warn!("[ble] advertising stop failed: {:?}", e);
        }
        let server = device.get_server();
        let peers: Vec<u16> = server.connections().map(|c| c.conn_handle()).collect();
        for handle in peers {
            if let Err(e) = server.disconnect(handle) {
                warn!("[ble] disconnect {} failed: {:?}", handle, e);
            }
        }
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), HidError> {
        BLEDevice::deinit_full().map_err(init_err)
    }

    fn is_connected(&self) -> bool {
        self.reports.is_some() && BLEDevice::take().get_server().connected_count() > 0
    }

    fn default_manufacturer(&self) -> String {
        DEFAULT_MANUFACTURER.to_string()
    }

    fn send_keyboard(&mut self, report: &KeyboardReport) -> Result<(), HidError> {
        notify(&self.reports()?.keyboard, &report.to_bytes());
        Ok(())
    }

    fn send_mouse(&mut self, report: &MouseReport) -> Result<(), HidError> {
        notify(&self.reports()?.mouse, &report.to_bytes());
        Ok(())
    }

    fn send_media(&mut self, keys: u16) -> Result<(), HidError> {
        notify(&self.reports()?.media, &keys.to_le_bytes());
        Ok(())
    }
}
