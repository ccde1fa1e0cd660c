//! JSON command grammar.
//!
//! A command is one JSON object naming a device and an action:
//!
//! ```text
//! {"device":"keyboard","action":"tap","key":"ENTER"}
//! {"device":"keyboard","action":"write","text":"hello","newline":true}
//! {"device":"mouse","action":"move","x":10,"y":-4}
//! {"type":"media","key":"VOLUME_UP","repeat":3}
//! ```
//!
//! Every non-blank command produces exactly one reply: `{"status":"ok"}` or
//! `{"status":"error","message":...}`.

mod consumer;
mod error;
mod keyboard;
mod mouse;
pub mod names;

pub use error::CommandError;

use crate::ble::HidDevice;
use crate::clock::Clock;
use crate::command::MAX_COMMAND_LEN;
use crate::status;
use log::debug;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for hold, gap and per-character delays.
pub const MAX_DELAY_MS: i64 = 1000;

/// Upper bound for `repeat`.
pub const MAX_REPEAT: i64 = 100;

pub struct CommandDispatcher {
    clock: Arc<dyn Clock>,
}

impl CommandDispatcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run one command against `hid` and build the reply.
    ///
    /// Blank input yields `None` and no reply.
    pub fn dispatch(&self, text: &str, hid: &mut HidDevice) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let reply = match self.execute(text, hid) {
            Ok(()) => status::ok(),
            Err(e) => {
                debug!("[cmd] rejected: {}", e);
                status::error(&e.to_string())
            }
        };
        Some(reply)
    }

    fn execute(&self, text: &str, hid: &mut HidDevice) -> Result<(), CommandError> {
        if text.len() > MAX_COMMAND_LEN {
            return Err(CommandError::TooLarge);
        }
        let command: Value =
            serde_json::from_str(text).map_err(|e| CommandError::Parse(e.to_string()))?;
        let device = command
            .get("device")
            .and_then(Value::as_str)
            .or_else(|| command.get("type").and_then(Value::as_str))
            .ok_or(CommandError::MissingDevice)?;

        let ctx = Context {
            command: &command,
            clock: self.clock.as_ref(),
        };
        match device.to_ascii_lowercase().as_str() {
            "keyboard" => keyboard::handle(&ctx, hid),
            "mouse" => mouse::handle(&ctx, hid),
            "consumer" | "media" => consumer::handle(&ctx, hid),
            _ => Err(CommandError::UnknownDevice(device.to_string())),
        }
    }
}

/// One parsed command plus what handlers need to run it.
pub(crate) struct Context<'a> {
    pub command: &'a Value,
    pub clock: &'a dyn Clock,
}

impl Context<'_> {
    /// First non-null field among `names`.
    pub fn field(&self, names: &[&str]) -> Option<&Value> {
        names
            .iter()
            .filter_map(|n| self.command.get(*n))
            .find(|v| !v.is_null())
    }

    pub fn action<'b>(&'b self, default: &'b str) -> &'b str {
        self.command
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    pub fn int(&self, names: &[&str], default: i64) -> i64 {
        self.field(names).map(as_int).unwrap_or(default)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.command.get(name).map(as_bool).unwrap_or(false)
    }

    /// `repeat` clamped to 1..=100.
    pub fn repeat(&self) -> u32 {
        self.int(&["repeat"], 1).clamp(1, MAX_REPEAT) as u32
    }

    /// A delay field clamped to 0..=1000 ms.
    pub fn delay(&self, names: &[&str], default_ms: i64) -> Duration {
        let ms = self.int(names, default_ms).clamp(0, MAX_DELAY_MS);
        Duration::from_millis(ms as u64)
    }

    pub fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            self.clock.sleep(delay);
        }
    }
}

/// Lenient integer read: numbers truncate, numeric strings parse,
/// anything else is 0.
pub(crate) fn as_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

pub(crate) fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(_) => as_int(value) != 0,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
