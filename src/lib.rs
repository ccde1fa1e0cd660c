//! BLE HID bridge firmware library.
//!
//! Accepts JSON commands over UART or WebSocket and replays them as BLE
//! keyboard, mouse and consumer-control reports. Everything except the
//! `esp32`-gated drivers builds and tests on the host.
//!
//! # Layout
//!
//! - [`config`], [`store`], [`session`] - persisted settings and the shared
//!   in-memory copy
//! - [`uart`], [`web`], [`coordinator`] - command transports and the task
//!   that switches between them
//! - [`command`], [`outbound`], [`status`] - the queues between tasks and
//!   the reply/event wire format
//! - [`wifi`], [`portal`] - station/AP management and the captive portal
//! - [`ble`], [`dispatch`] - the HID stack and the command grammar
//! - [`runtime`] - startup and task wiring

// Lets proc-macro generated code refer to `::ble_hid_bridge` from inside the crate
extern crate self as ble_hid_bridge;

pub mod ble;
pub mod clock;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod outbound;
pub mod portal;
pub mod runtime;
pub mod session;
pub mod status;
pub mod store;
#[cfg(feature = "tap-tests")]
pub mod testing;
pub mod uart;
pub mod web;
pub mod wifi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{command_channel, CommandMessage, Origin};
pub use config::{BaudRate, DeviceConfig, TransportMode};
pub use dispatch::CommandDispatcher;
pub use runtime::{start, Bridge, BridgeError, BridgeOptions, Platform};
pub use session::SessionState;

#[cfg(feature = "tap-tests")]
pub use testing::TestRunner;
