//! ESP32 Non-Volatile Storage backend.
//!
//! Each [`KeyValueStore`] namespace maps to an NVS namespace. String writes
//! are read back and compared to catch silent flash write failures.
//!
//! # Security
//!
//! WiFi passwords are stored in plain NVS unless the partition is encrypted.

use super::{KeyValueStore, StoreError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use std::sync::Mutex;

/// Longest string value we read back (WiFi password is 64 bytes max).
const MAX_STR_LEN: usize = 128;

static DEFAULT_PARTITION: Mutex<Option<EspDefaultNvsPartition>> = Mutex::new(None);

/// Shared handle to the default NVS partition.
///
/// `EspNvsPartition::take()` may only succeed once per boot; the WiFi driver
/// and the config store both need the partition, so the handle is cached and
/// cloned. Safe to call multiple times.
pub fn nvs_default_partition() -> Result<EspDefaultNvsPartition, EspError> {
    let mut cached = DEFAULT_PARTITION.lock().unwrap();
    if let Some(partition) = cached.as_ref() {
        return Ok(partition.clone());
    }
    let partition = EspNvsPartition::<NvsDefault>::take()?;
    *cached = Some(partition.clone());
    Ok(partition)
}

/// NVS-backed [`KeyValueStore`].
pub struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        Self { partition }
    }

    /// Store on the shared default partition.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(nvs_default_partition()?))
    }

    // Opened read-write even for reads: a read-only open of a namespace that
    // was never written fails with ESP_ERR_NVS_NOT_FOUND.
    fn open(&self, namespace: &str) -> Result<EspNvs<NvsDefault>, StoreError> {
        Ok(EspNvs::new(self.partition.clone(), namespace, true)?)
    }

    fn read_str(nvs: &EspNvs<NvsDefault>, key: &str) -> Result<Option<String>, StoreError> {
        let mut buf = [0u8; MAX_STR_LEN + 1];
        Ok(nvs.get_str(key, &mut buf)?.map(str::to_string))
    }
}

impl KeyValueStore for NvsStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StoreError> {
        let nvs = self.open(namespace)?;
        Ok(nvs.get_u8(key)?)
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StoreError> {
        let mut nvs = self.open(namespace)?;
        nvs.set_u8(key, value)?;
        Ok(())
    }

    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, StoreError> {
        let nvs = self.open(namespace)?;
        Ok(nvs.get_u32(key)?)
    }

    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> Result<(), StoreError> {
        let mut nvs = self.open(namespace)?;
        nvs.set_u32(key, value)?;
        Ok(())
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let nvs = self.open(namespace)?;
        Self::read_str(&nvs, key)
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        if value.len() > MAX_STR_LEN {
            return Err(StoreError::InvalidFormat(format!(
                "{}/{} longer than {} bytes",
                namespace, key, MAX_STR_LEN
            )));
        }
        let mut nvs = self.open(namespace)?;
        nvs.set_str(key, value)?;

        // Read back and verify to catch silent flash write failures
        let read_back = Self::read_str(&nvs, key)?;
        if read_back.as_deref() != Some(value) {
            log::error!("[store] {}/{} verification failed after save", namespace, key);
            return Err(StoreError::VerificationFailed {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut nvs = self.open(namespace)?;
        nvs.remove(key)?;
        Ok(())
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use ble_hid_bridge_macros::tap_test;

    const TEST_NS: &str = "tap_test";

    #[tap_test]
    fn nvs_open_default() -> crate::testing::TestResult {
        NvsStore::open_default()?;
        Ok(())
    }

    #[tap_test]
    fn nvs_u8_u32_round_trip() -> crate::testing::TestResult {
        let mut store = NvsStore::open_default()?;
        store.set_u8(TEST_NS, "mode", 1)?;
        store.set_u32(TEST_NS, "baud", 921600)?;
        assert_eq!(store.get_u8(TEST_NS, "mode")?, Some(1));
        assert_eq!(store.get_u32(TEST_NS, "baud")?, Some(921600));
        Ok(())
    }

    #[tap_test]
    fn nvs_string_round_trip_and_remove() -> crate::testing::TestResult {
        let mut store = NvsStore::open_default()?;
        store.set_str(TEST_NS, "ssid", "TapTestNetwork")?;
        assert_eq!(store.get_str(TEST_NS, "ssid")?.as_deref(), Some("TapTestNetwork"));

        store.remove(TEST_NS, "ssid")?;
        assert_eq!(store.get_str(TEST_NS, "ssid")?, None);
        Ok(())
    }

    #[tap_test]
    fn nvs_oversized_string_rejected() {
        let mut store = NvsStore::open_default().unwrap();
        let long = "x".repeat(MAX_STR_LEN + 1);
        assert!(store.set_str(TEST_NS, "long", &long).is_err());
    }
}
