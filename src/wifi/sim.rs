//! In-process radio for host runs and tests.
//!
//! Models a handful of access points. Connection completes after a fixed
//! number of status polls so the controller's polling loop is exercised.

use super::events::reason;
use super::{
    ApSettings, Association, AuthMode, ConnectTarget, LinkStatus, RadioError, RadioMode,
    ScanEntry, WifiEventFlags, WifiRadio,
};
use log::debug;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// One simulated access point.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    pub password: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i8,
    pub auth: AuthMode,
    /// When false the AP accepts nothing and never answers, so attempts
    /// run into the timeout.
    pub responsive: bool,
}

impl SimNetwork {
    pub fn new(ssid: &str, password: &str, rssi: i8) -> Self {
        let mut bssid = [0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
        for (i, b) in ssid.bytes().enumerate() {
            bssid[2 + i % 4] ^= b;
        }
        Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid,
            channel: 6,
            rssi,
            auth: if password.is_empty() {
                AuthMode::Open
            } else {
                AuthMode::Wpa2Psk
            },
            responsive: true,
        }
    }
}

#[derive(Debug)]
struct SimState {
    networks: Vec<SimNetwork>,
    mode: RadioMode,
    ap: Option<ApSettings>,
    link: LinkStatus,
    pending: Option<(SimNetwork, u32)>,
    association: Option<Association>,
    connect_polls: u32,
    fail_scan: bool,
    fail_mode_change: bool,
    connects: Vec<ConnectTarget>,
    modes: Vec<RadioMode>,
    next_host: u8,
}

/// Simulated [`WifiRadio`]. Clones share state.
#[derive(Clone)]
pub struct SimulatedRadio {
    state: Arc<Mutex<SimState>>,
    flags: Arc<WifiEventFlags>,
}

impl SimulatedRadio {
    pub fn new(flags: Arc<WifiEventFlags>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                networks: Vec::new(),
                mode: RadioMode::Off,
                ap: None,
                link: LinkStatus::Idle,
                pending: None,
                association: None,
                connect_polls: 2,
                fail_scan: false,
                fail_mode_change: false,
                connects: Vec::new(),
                modes: Vec::new(),
                next_host: 100,
            })),
            flags,
        }
    }

    /// A radio that can see a couple of networks, for the host binary.
    pub fn with_demo_networks(flags: Arc<WifiEventFlags>) -> Self {
        let radio = Self::new(flags);
        radio.add_network(SimNetwork::new("bridge-lab", "simulate123", -48));
        radio.add_network(SimNetwork::new("CoffeeShop", "", -71));
        radio
    }

    pub fn add_network(&self, network: SimNetwork) {
        self.state.lock().unwrap().networks.push(network);
    }

    pub fn remove_network(&self, ssid: &str) {
        self.state.lock().unwrap().networks.retain(|n| n.ssid != ssid);
    }

    /// Status polls before a pending connection completes.
    pub fn set_connect_polls(&self, polls: u32) {
        self.state.lock().unwrap().connect_polls = polls;
    }

    pub fn set_fail_scan(&self, fail: bool) {
        self.state.lock().unwrap().fail_scan = fail;
    }

    pub fn set_fail_mode_change(&self, fail: bool) {
        self.state.lock().unwrap().fail_mode_change = fail;
    }

    /// Drop the current association as if the AP vanished.
    pub fn drop_link(&self, reason: u16) {
        let mut state = self.state.lock().unwrap();
        state.link = LinkStatus::Disconnected;
        state.association = None;
        state.pending = None;
        self.flags.notify_disconnected(reason);
    }

    pub fn current_mode(&self) -> RadioMode {
        self.state.lock().unwrap().mode
    }

    pub fn ap_running(&self) -> bool {
        self.state.lock().unwrap().ap.is_some()
    }

    /// Every target passed to `begin_connect`, oldest first.
    pub fn connect_history(&self) -> Vec<ConnectTarget> {
        self.state.lock().unwrap().connects.clone()
    }

    /// Every mode passed to `set_mode`, oldest first.
    pub fn mode_history(&self) -> Vec<RadioMode> {
        self.state.lock().unwrap().modes.clone()
    }
}

impl WifiRadio for SimulatedRadio {
    fn mode(&self) -> RadioMode {
        self.state.lock().unwrap().mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mode_change {
            return Err(RadioError::Driver("mode change rejected".into()));
        }
        state.modes.push(mode);
        if !mode.has_station() {
            state.link = LinkStatus::Idle;
            state.association = None;
            state.pending = None;
        }
        if !mode.has_access_point() {
            state.ap = None;
        }
        state.mode = mode;
        Ok(())
    }

    fn start_access_point(&mut self, settings: &ApSettings) -> Result<Ipv4Addr, RadioError> {
        let mut state = self.state.lock().unwrap();
        if !state.mode.has_access_point() {
            return Err(RadioError::NotReady);
        }
        state.ap = Some(settings.clone());
        Ok(settings.ip)
    }

    fn stop_access_point(&mut self) -> Result<(), RadioError> {
        self.state.lock().unwrap().ap = None;
        Ok(())
    }

    fn begin_connect(&mut self, target: &ConnectTarget) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        if !state.mode.has_station() {
            return Err(RadioError::NotReady);
        }
        state.connects.push(target.clone());
        state.association = None;

        let found = state
            .networks
            .iter()
            .find(|n| n.ssid == target.ssid && target.bssid.map_or(true, |b| b == n.bssid))
            .cloned();
        match found {
            None => {
                debug!("[sim] {:?} not in range", target.ssid);
                state.link = LinkStatus::NoApFound;
                self.flags.notify_disconnected(reason::NO_AP_FOUND);
            }
            Some(network) if !network.responsive => {
                state.link = LinkStatus::Connecting;
                state.pending = None;
            }
            Some(network) if network.password != target.password => {
                state.link = LinkStatus::AuthFailed;
                self.flags.notify_disconnected(reason::AUTH_FAIL);
            }
            Some(network) => {
                let polls = state.connect_polls;
                state.link = LinkStatus::Connecting;
                state.pending = Some((network, polls));
            }
        }
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        let mut state = self.state.lock().unwrap();
        if let Some((network, remaining)) = state.pending.take() {
            if remaining > 1 {
                state.pending = Some((network, remaining - 1));
            } else {
                let host = state.next_host;
                state.next_host = state.next_host.wrapping_add(1);
                state.association = Some(Association {
                    ssid: network.ssid.clone(),
                    bssid: Some(network.bssid),
                    channel: Some(network.channel),
                    ip: Some(Ipv4Addr::new(192, 168, 1, host)),
                });
                state.link = LinkStatus::Connected;
            }
        }
        state.link
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        state.link = LinkStatus::Disconnected;
        state.association = None;
        state.pending = None;
        Ok(())
    }

    fn association(&self) -> Option<Association> {
        self.state.lock().unwrap().association.clone()
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError> {
        let state = self.state.lock().unwrap();
        if !state.mode.has_station() {
            return Err(RadioError::NotReady);
        }
        if state.fail_scan {
            return Err(RadioError::ScanFailed("simulated".into()));
        }
        Ok(state
            .networks
            .iter()
            .map(|n| ScanEntry {
                ssid: n.ssid.clone(),
                bssid: n.bssid,
                rssi: n.rssi,
                channel: n.channel,
                auth: n.auth,
            })
            .collect())
    }

    fn mac_address(&self) -> [u8; 6] {
        [0x02, 0xB1, 0xE0, 0x00, 0x3F, 0x2A]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio() -> (SimulatedRadio, Arc<WifiEventFlags>) {
        let flags = Arc::new(WifiEventFlags::new());
        let radio = SimulatedRadio::new(flags.clone());
        radio.add_network(SimNetwork::new("Home", "secret123", -50));
        (radio, flags)
    }

    #[test]
    fn test_connect_completes_after_polls() {
        let (mut radio, flags) = radio();
        radio.set_mode(RadioMode::Station).unwrap();
        radio
            .begin_connect(&ConnectTarget::new("Home", "secret123"))
            .unwrap();
        assert_eq!(radio.link_status(), LinkStatus::Connecting);
        assert_eq!(radio.link_status(), LinkStatus::Connected);
        assert_eq!(flags.take().disconnected, None);
        assert_eq!(radio.association().unwrap().ssid, "Home");
    }

    #[test]
    fn test_wrong_password_and_missing_ap() {
        let (mut radio, flags) = radio();
        radio.set_mode(RadioMode::Station).unwrap();

        radio
            .begin_connect(&ConnectTarget::new("Home", "wrong-pass"))
            .unwrap();
        assert_eq!(radio.link_status(), LinkStatus::AuthFailed);
        assert!(flags.take().disconnected.is_some());

        radio
            .begin_connect(&ConnectTarget::new("Elsewhere", "secret123"))
            .unwrap();
        assert_eq!(radio.link_status(), LinkStatus::NoApFound);
    }

    #[test]
    fn test_requires_station_interface() {
        let (mut radio, _) = radio();
        radio.set_mode(RadioMode::AccessPoint).unwrap();
        assert_eq!(
            radio.begin_connect(&ConnectTarget::new("Home", "secret123")),
            Err(RadioError::NotReady)
        );
        assert_eq!(radio.scan(), Err(RadioError::NotReady));
    }

    #[test]
    fn test_leaving_ap_mode_stops_ap() {
        let (mut radio, _) = radio();
        radio.set_mode(RadioMode::AccessPoint).unwrap();
        radio.start_access_point(&ApSettings::default()).unwrap();
        assert!(radio.ap_running());
        radio.set_mode(RadioMode::Station).unwrap();
        assert!(!radio.ap_running());
    }
}
