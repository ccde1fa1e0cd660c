//! File-backed store for host (development) builds.
//!
//! Each namespace is a JSON object in `<dir>/<namespace>.json`. The default
//! directory is `~/.ble-hid-bridge/`, so configuration survives restarts of
//! the host simulator the same way NVS survives a reboot.

use super::{KeyValueStore, StoreError};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default storage directory.
///
/// Returns `~/.ble-hid-bridge`
pub fn default_store_dir() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".ble-hid-bridge"))
}

/// JSON-file [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`default_store_dir`].
    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(default_store_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    fn load_namespace(&self, namespace: &str) -> Result<Map<String, Value>, StoreError> {
        let path = self.namespace_path(namespace);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("[store] no file for namespace {:?} at {:?}", namespace, path);
                return Ok(Map::new());
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::InvalidFormat(format!(
                "{:?} is not a JSON object",
                path
            ))),
        }
    }

    fn save_namespace(&self, namespace: &str, map: Map<String, Value>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.namespace_path(namespace);
        let text = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&path, &text)?;

        // Verify write by reading back
        let read_back = fs::read_to_string(&path)?;
        if read_back != text {
            return Err(StoreError::VerificationFailed {
                namespace: namespace.to_string(),
                key: "*".to_string(),
            });
        }
        Ok(())
    }

    fn get_value(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load_namespace(namespace)?.remove(key))
    }

    fn set_value(&mut self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.load_namespace(namespace)?;
        map.insert(key.to_string(), value);
        self.save_namespace(namespace, map)
    }
}

fn expect_uint(namespace: &str, key: &str, value: Value, max: u64) -> Result<u64, StoreError> {
    value
        .as_u64()
        .filter(|v| *v <= max)
        .ok_or_else(|| StoreError::InvalidFormat(format!("{}/{} out of range", namespace, key)))
}

impl KeyValueStore for FileStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StoreError> {
        self.get_value(namespace, key)?
            .map(|v| expect_uint(namespace, key, v, u8::MAX as u64).map(|v| v as u8))
            .transpose()
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StoreError> {
        self.set_value(namespace, key, Value::from(value))
    }

    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>, StoreError> {
        self.get_value(namespace, key)?
            .map(|v| expect_uint(namespace, key, v, u32::MAX as u64).map(|v| v as u32))
            .transpose()
    }

    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> Result<(), StoreError> {
        self.set_value(namespace, key, Value::from(value))
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        match self.get_value(namespace, key)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(StoreError::InvalidFormat(format!(
                "{}/{} is not a string",
                namespace, key
            ))),
        }
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_value(namespace, key, Value::from(value))
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut map = self.load_namespace(namespace)?;
        if map.remove(key).is_some() {
            self.save_namespace(namespace, map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test directories even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("ble-hid-bridge-test-{}-{}", pid, id))
    }

    #[test]
    fn test_typed_values_persist() {
        let dir = unique_store_dir();
        let mut store = FileStore::new(&dir);

        store.set_u8("device", "transport", 1).unwrap();
        store.set_u32("device", "baud", 230400).unwrap();
        store.set_str("wifi", "ssid", "Home").unwrap();

        let reopened = FileStore::new(&dir);
        assert_eq!(reopened.get_u8("device", "transport").unwrap(), Some(1));
        assert_eq!(reopened.get_u32("device", "baud").unwrap(), Some(230400));
        assert_eq!(reopened.get_str("wifi", "ssid").unwrap().as_deref(), Some("Home"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_directory_reads_empty() {
        let dir = unique_store_dir();
        let store = FileStore::new(&dir);
        assert_eq!(store.get_str("wifi", "ssid").unwrap(), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_remove_key() {
        let dir = unique_store_dir();
        let mut store = FileStore::new(&dir);

        store.set_str("wifi", "ssid", "Home").unwrap();
        store.set_str("wifi", "password", "secret123").unwrap();
        store.remove("wifi", "password").unwrap();

        assert_eq!(store.get_str("wifi", "password").unwrap(), None);
        assert_eq!(store.get_str("wifi", "ssid").unwrap().as_deref(), Some("Home"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_out_of_range_u8_rejected() {
        let dir = unique_store_dir();
        let mut store = FileStore::new(&dir);
        store.set_u32("device", "transport", 300).unwrap();
        assert!(matches!(
            store.get_u8("device", "transport"),
            Err(StoreError::InvalidFormat(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = unique_store_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("device.json"), "not json").unwrap();

        let store = FileStore::new(&dir);
        assert!(store.get_u8("device", "transport").is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
