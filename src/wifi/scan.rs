//! Scan result post-processing.

use super::{AuthMode, ScanEntry};
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// Most networks reported per scan.
pub const MAX_SCAN_RESULTS: usize = 20;

/// One network as reported to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
    #[serde(serialize_with = "serialize_auth")]
    pub auth: AuthMode,
    pub secure: bool,
    pub hidden: bool,
}

fn serialize_auth<S: Serializer>(auth: &AuthMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(auth.as_str())
}

impl From<&ScanEntry> for NetworkInfo {
    fn from(entry: &ScanEntry) -> Self {
        Self {
            ssid: entry.ssid.clone(),
            rssi: entry.rssi,
            channel: entry.channel,
            auth: entry.auth,
            secure: entry.auth.is_secure(),
            hidden: entry.ssid.is_empty(),
        }
    }
}

/// Strongest first, one entry per SSID, at most [`MAX_SCAN_RESULTS`].
///
/// Hidden networks have no SSID to merge on, so each is kept.
pub fn summarize(mut entries: Vec<ScanEntry>) -> Vec<NetworkInfo> {
    entries.sort_by(|a, b| b.rssi.cmp(&a.rssi));

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| e.ssid.is_empty() || seen.insert(e.ssid.clone()))
        .take(MAX_SCAN_RESULTS)
        .map(NetworkInfo::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ssid: &str, rssi: i8, auth: AuthMode) -> ScanEntry {
        ScanEntry {
            ssid: ssid.into(),
            bssid: [0, 1, 2, 3, 4, rssi as u8],
            rssi,
            channel: 6,
            auth,
        }
    }

    #[test]
    fn test_sorted_by_rssi_descending() {
        let out = summarize(vec![
            entry("weak", -80, AuthMode::Open),
            entry("strong", -40, AuthMode::Wpa2Psk),
            entry("mid", -60, AuthMode::Wpa3Psk),
        ]);
        let ssids: Vec<_> = out.iter().map(|n| n.ssid.as_str()).collect();
        assert_eq!(ssids, vec!["strong", "mid", "weak"]);
    }

    #[test]
    fn test_duplicates_keep_strongest() {
        let out = summarize(vec![
            entry("Home", -70, AuthMode::Wpa2Psk),
            entry("Home", -50, AuthMode::Wpa2Psk),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rssi, -50);
    }

    #[test]
    fn test_hidden_networks_kept_and_flagged() {
        let out = summarize(vec![
            entry("", -70, AuthMode::Wpa2Psk),
            entry("", -75, AuthMode::Wpa2Psk),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.hidden));
    }

    #[test]
    fn test_truncated_to_limit() {
        let entries = (0..30)
            .map(|i| entry(&format!("net{}", i), -(i as i8) - 30, AuthMode::Open))
            .collect();
        assert_eq!(summarize(entries).len(), MAX_SCAN_RESULTS);
    }

    #[test]
    fn test_serializes_auth_string() {
        let info = NetworkInfo::from(&entry("Cafe", -55, AuthMode::Open));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["auth"], "open");
        assert_eq!(value["secure"], false);
        assert_eq!(value["hidden"], false);
    }
}
