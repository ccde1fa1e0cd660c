//! Volatile in-memory store.

use super::{KeyValueStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    U8(u8),
    U32(u32),
    Str(String),
}

/// In-memory [`KeyValueStore`].
///
/// Clones share the same contents, so a test can keep a handle for
/// inspection after boxing another one into a [`ConfigStore`](super::ConfigStore).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(String, String), StoredValue>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored keys across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, namespace: &str, key: &str) -> Option<StoredValue> {
        self.entries
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn put(&mut self, namespace: &str, key: &str, value: StoredValue) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap()
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".into()));
        }
        Ok(())
    }
}

fn type_mismatch(namespace: &str, key: &str, expected: &str) -> StoreError {
    StoreError::InvalidFormat(format!("{}/{} is not a {}", namespace, key, expected))
}

impl KeyValueStore for MemoryStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StoreError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U8(v)) => Ok(Some(v)),
            Some(_) => Err(type_mismatch(namespace, key, "u8")),
        }
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StoreError> {
        self.put(namespace, key, StoredValue::U8(value))
    }

    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, StoreError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(StoredValue::U32(v)) => Ok(Some(v)),
            Some(_) => Err(type_mismatch(namespace, key, "u32")),
        }
    }

    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> Result<(), StoreError> {
        self.put(namespace, key, StoredValue::U32(value))
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(StoredValue::Str(v)) => Ok(Some(v)),
            Some(_) => Err(type_mismatch(namespace, key, "string")),
        }
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(namespace, key, StoredValue::Str(value.to_string()))
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_u8("device", "transport").unwrap(), None);
        assert_eq!(store.get_str("wifi", "ssid").unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let mut store = MemoryStore::new();
        store.set_str("wifi", "ssid", "Home").unwrap();
        assert_eq!(store.get_str("device", "ssid").unwrap(), None);
        assert_eq!(store.get_str("wifi", "ssid").unwrap().as_deref(), Some("Home"));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let mut store = MemoryStore::new();
        store.set_u32("device", "baud", 9600).unwrap();
        assert!(matches!(
            store.get_u8("device", "baud"),
            Err(StoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_remove_missing_key_ok() {
        let mut store = MemoryStore::new();
        assert!(store.remove("wifi", "ssid").is_ok());
    }

    #[test]
    fn test_fail_writes() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.set_u8("device", "transport", 1).is_err());
        assert!(store.is_empty());

        store.set_fail_writes(false);
        store.set_u8("device", "transport", 1).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clones_share_contents() {
        let mut a = MemoryStore::new();
        let b = a.clone();
        a.set_u32("device", "baud", 57600).unwrap();
        assert_eq!(b.get_u32("device", "baud").unwrap(), Some(57600));
    }
}
