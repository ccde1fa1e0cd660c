//! Persistent key/value configuration storage.
//!
//! [`KeyValueStore`] is the raw preference store (namespaced typed keys).
//! [`ConfigStore`] maps [`DeviceConfig`](crate::config::DeviceConfig) onto it.
//!
//! Backends:
//! - [`MemoryStore`] - volatile, for tests
//! - [`FileStore`] - JSON files under `~/.ble-hid-bridge/` (host builds)
//! - `NvsStore` - ESP32 Non-Volatile Storage (`esp32` feature)

mod config_store;
mod error;
mod file;
mod memory;
#[cfg(feature = "esp32")]
mod nvs;

pub use config_store::{keys, ConfigStore};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "esp32")]
pub use nvs::{nvs_default_partition, NvsStore};

/// Namespaced typed preference storage.
///
/// Mirrors the NVS API surface: a missing key reads as `Ok(None)`, and
/// removing a missing key is not an error.
pub trait KeyValueStore: Send {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StoreError>;
    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StoreError>;

    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, StoreError>;
    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> Result<(), StoreError>;

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;
    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError>;
}
