//! WiFi station/access-point state machine.
//!
//! [`WifiStationController`] is owned by a single task. Everything it does
//! happens either in [`process`](WifiStationController::process) (one tick,
//! non-blocking) or in one of the request methods, which may block for one
//! bounded connection attempt.
//!
//! # Policy
//!
//! - Boot with saved credentials tries the station alone first, so the portal
//!   is not advertised when the network is fine.
//! - With no usable station the soft-AP and captive portal are up, and saved
//!   credentials are retried on an exponential backoff with jitter.
//! - After the station connects with the AP up, the AP stays for a short
//!   grace window ([`WifiTimings::ap_grace`]) so the portal page can show the
//!   result before the phone is dropped.
//! - New credentials received while connected are provisional: they are
//!   persisted only once they work, otherwise the previous network is
//!   rejoined (pinned to its BSSID and channel).

use super::error::{ConnectOutcome, FailureReason, WifiError};
use super::scan::{summarize, NetworkInfo};
use super::state::{SharedWifiStatus, WifiConnectionState, WifiPhase, WifiStatePublisher};
use super::{
    ApSettings, Association, Backoff, ConnectTarget, DisconnectKind, LinkStatus, RadioMode,
    WifiEventFlags, WifiRadio, WifiTimings,
};
use crate::clock::{deadline_reached, Clock, Millis};
use crate::config::{DeviceConfig, WifiCredentials};
use crate::outbound::EventSink;
use crate::portal::CaptivePortal;
use crate::session::SessionState;
use crate::status::{self, events};
use crate::store::{ConfigStore, StoreError};
use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct WifiStationController {
    radio: Box<dyn WifiRadio>,
    portal: Box<dyn CaptivePortal>,
    flags: Arc<WifiEventFlags>,
    session: Arc<SessionState>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    timings: WifiTimings,
    ap: ApSettings,
    state: WifiConnectionState,
    ap_active: bool,
    ap_ip: Option<Ipv4Addr>,
    backoff: Backoff,
    next_retry_at: Option<Millis>,
    ap_shutdown_at: Option<Millis>,
    /// Next attempt at bringing up an access point that failed to start.
    ap_retry_at: Option<Millis>,
    /// Previous association, only while a provisional switch is in flight.
    rollback: Option<ConnectTarget>,
    publisher: WifiStatePublisher,
    status: SharedWifiStatus,
}

impl WifiStationController {
    /// `flags` must be the same latch the radio's driver callbacks write to.
    pub fn new(
        radio: Box<dyn WifiRadio>,
        flags: Arc<WifiEventFlags>,
        portal: Box<dyn CaptivePortal>,
        session: Arc<SessionState>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timings = WifiTimings::default();
        let ap = ApSettings::for_mac(radio.mac_address());
        let mut backoff = Backoff::new(&timings);
        backoff.seed_from_os();

        Self {
            radio,
            portal,
            flags,
            session,
            events,
            clock,
            timings,
            ap,
            state: WifiConnectionState::AccessPointOnly,
            ap_active: false,
            ap_ip: None,
            backoff,
            next_retry_at: None,
            ap_shutdown_at: None,
            ap_retry_at: None,
            rollback: None,
            publisher: WifiStatePublisher::default(),
            status: Arc::new(Mutex::new(Default::default())),
        }
    }

    pub fn with_timings(mut self, timings: WifiTimings) -> Self {
        self.timings = timings;
        self.backoff = Backoff::new(&timings);
        self.backoff.seed_from_os();
        self
    }

    pub fn with_ap_settings(mut self, ap: ApSettings) -> Self {
        self.ap = ap;
        self
    }

    /// Fix the jitter sequence (tests).
    pub fn seed_backoff(&mut self, seed: u32) {
        self.backoff.seed(seed);
    }

    /// Shared status view, updated after every transition.
    pub fn status_handle(&self) -> SharedWifiStatus {
        self.status.clone()
    }

    pub fn state(&self) -> WifiConnectionState {
        self.state
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ap_settings(&self) -> &ApSettings {
        &self.ap
    }

    pub fn is_ap_active(&self) -> bool {
        self.ap_active
    }

    /// Time until the next backoff-gated reconnect, if one is scheduled.
    pub fn next_retry_in(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.next_retry_at
            .map(|at| Duration::from_millis(at.saturating_sub(now)))
    }

    // ==================== Operations ====================

    /// Boot-time bring-up.
    pub fn initialize(&mut self) {
        let saved = self.session.snapshot().wifi;
        let Some(creds) = saved.filter(|c| !c.ssid.is_empty()) else {
            info!("[wifi] no saved credentials, starting access point");
            self.enter_access_point_mode();
            self.events.emit(status::event(events::WIFI_CONFIG_MODE));
            return;
        };

        info!("[wifi] saved credentials for {:?}, trying station only", creds.ssid);
        let target = ConnectTarget::new(creds.ssid.as_str(), creds.password.as_str());
        match self.connect_station(&target, RadioMode::Station, self.timings.connect_timeout) {
            Ok(()) => self.on_connected(&target.ssid),
            Err(reason) => {
                warn!("[wifi] boot connect to {:?} failed: {}", target.ssid, reason);
                self.fall_back_to_access_point(&target.ssid, &reason);
                self.events.emit(status::event(events::WIFI_CONFIG_MODE));
            }
        }
    }

    /// Apply new station credentials.
    ///
    /// Blocks for at most one connection attempt (plus the rollback window
    /// when switching away from a working network).
    pub fn set_credentials(
        &mut self,
        ssid: &str,
        password: &str,
    ) -> Result<ConnectOutcome, WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::EmptySsid);
        }
        let target = ConnectTarget::new(ssid, password);
        self.events
            .emit(status::event_with_detail(events::WIFI_CONNECTING, ssid));

        let outcome = if self.state.is_station_connected() {
            self.provisional_switch(target)
        } else if self.ap_active {
            self.portal_connect(target)
        } else {
            self.direct_connect(target)
        };
        self.refresh_status();
        Ok(outcome)
    }

    /// Erase saved credentials and go back to the portal.
    pub fn forget_credentials(&mut self) {
        info!("[wifi] forgetting credentials");
        self.session.update(|c| c.set_wifi(None));
        self.persist_or_warn(|store, _| store.save_wifi(None), "Failed to clear WiFi credentials");

        self.rollback = None;
        self.backoff.reset();
        self.next_retry_at = None;
        if self.radio.mode().has_station() {
            if let Err(e) = self.radio.disconnect() {
                debug!("[wifi] disconnect: {}", e);
            }
        }
        self.enter_access_point_mode();
        self.events.emit(status::event(events::WIFI_CONFIG_MODE));
        self.refresh_status();
    }

    /// Scan without dropping the portal.
    ///
    /// The station interface is enabled for the duration of the scan and
    /// the previous mode restored afterwards.
    pub fn scan_networks(&mut self) -> Result<Vec<NetworkInfo>, WifiError> {
        let previous = self.radio.mode();
        let scan_mode = match previous {
            RadioMode::AccessPoint => RadioMode::AccessPointStation,
            RadioMode::Off => RadioMode::Station,
            other => other,
        };

        if scan_mode != previous {
            if let Err(e) = self.radio.set_mode(scan_mode) {
                warn!("[wifi] cannot enable station for scan: {}", e);
                return Err(WifiError::NotReady);
            }
        }

        let result = self.radio.scan();

        if scan_mode != previous {
            if let Err(e) = self.radio.set_mode(previous) {
                error!("[wifi] failed to restore {:?} after scan: {}", previous, e);
            }
        }

        let entries = result.map_err(|e| {
            warn!("[wifi] scan failed: {}", e);
            WifiError::ScanFailed(e.to_string())
        })?;
        let networks = summarize(entries);
        debug!("[wifi] scan found {} networks", networks.len());
        Ok(networks)
    }

    /// Advance the state machine by one tick.
    pub fn process(&mut self) {
        let now = self.clock.now_ms();
        let events = self.flags.take();

        match self.state {
            WifiConnectionState::Connected | WifiConnectionState::TransitioningToSta => {
                let link = self.radio.link_status();
                if events.disconnected.is_some() || link != LinkStatus::Connected {
                    self.on_link_lost(events.disconnected);
                } else if self.state == WifiConnectionState::TransitioningToSta
                    && self.ap_shutdown_at.is_some_and(|at| deadline_reached(now, at))
                {
                    self.finish_sta_transition();
                }
            }
            WifiConnectionState::AccessPointOnly => {
                if !self.ap_active {
                    match self.ap_retry_at {
                        None => self.schedule_ap_retry(),
                        Some(at) if deadline_reached(now, at) => {
                            info!("[wifi] retrying access point start");
                            self.enter_access_point_mode();
                        }
                        Some(_) => {}
                    }
                }
                if !self.session.snapshot().has_wifi_credentials() {
                    self.next_retry_at = None;
                } else {
                    match self.next_retry_at {
                        None => self.schedule_retry(),
                        Some(at) if deadline_reached(now, at) => self.retry_saved(),
                        Some(_) => {}
                    }
                }
            }
            // Only observed inside a blocking attempt
            WifiConnectionState::Connecting => {}
        }
        self.refresh_status();
    }

    // ==================== Connect paths ====================

    /// AP up, station down: try `target` with the portal still running.
    fn portal_connect(&mut self, target: ConnectTarget) -> ConnectOutcome {
        match self.connect_station(
            &target,
            RadioMode::AccessPointStation,
            self.timings.connect_timeout,
        ) {
            Ok(()) => {
                self.persist_credentials(&target);
                self.on_connected(&target.ssid);
                ConnectOutcome::Connected {
                    ssid: target.ssid.clone(),
                }
            }
            Err(reason) => {
                warn!("[wifi] {:?} failed: {}", target.ssid, reason);
                self.fall_back_to_access_point(&target.ssid, &reason);
                ConnectOutcome::Failed { reason }
            }
        }
    }

    /// Station connected: try `target`, roll back to the current network
    /// if it does not work.
    fn provisional_switch(&mut self, target: ConnectTarget) -> ConnectOutcome {
        let previous = self.snapshot_association();
        info!(
            "[wifi] provisional switch {:?} -> {:?}",
            previous.as_ref().map(|p| p.ssid.as_str()),
            target.ssid
        );
        self.rollback = previous;
        self.ap_shutdown_at = None;
        if let Err(e) = self.radio.disconnect() {
            debug!("[wifi] disconnect: {}", e);
        }

        let mode = self.station_mode();
        let result = self.connect_station(&target, mode, self.timings.connect_timeout);
        let rollback = self.rollback.take();

        let reason = match result {
            Ok(()) => {
                self.persist_credentials(&target);
                self.on_connected(&target.ssid);
                return ConnectOutcome::Connected {
                    ssid: target.ssid.clone(),
                };
            }
            Err(reason) => reason,
        };

        warn!("[wifi] new network {:?} failed: {}", target.ssid, reason);
        self.publish(WifiPhase::Failed, Some(&target.ssid), Some(reason.message()));

        let Some(previous) = rollback else {
            self.fall_back_to_access_point(&target.ssid, &reason);
            return ConnectOutcome::Failed { reason };
        };

        info!("[wifi] rolling back to {:?}", previous.ssid);
        match self.connect_station(&previous, mode, self.timings.rollback_timeout) {
            Ok(()) => {
                self.on_connected(&previous.ssid);
                ConnectOutcome::RolledBack {
                    previous_ssid: previous.ssid.clone(),
                    reason,
                }
            }
            Err(rollback_reason) => {
                error!("[wifi] rollback to {:?} failed: {}", previous.ssid, rollback_reason);
                self.fall_back_to_access_point(&target.ssid, &reason);
                ConnectOutcome::Failed { reason }
            }
        }
    }

    /// Neither AP nor station up: persist first, then try.
    fn direct_connect(&mut self, target: ConnectTarget) -> ConnectOutcome {
        self.persist_credentials(&target);
        match self.connect_station(&target, RadioMode::Station, self.timings.connect_timeout) {
            Ok(()) => {
                self.on_connected(&target.ssid);
                ConnectOutcome::Connected {
                    ssid: target.ssid.clone(),
                }
            }
            Err(reason) => {
                self.fall_back_to_access_point(&target.ssid, &reason);
                self.events.emit(status::event(events::WIFI_CONFIG_MODE));
                ConnectOutcome::Failed { reason }
            }
        }
    }

    /// Backoff expired: retry the saved network, portal still up.
    fn retry_saved(&mut self) {
        self.next_retry_at = None;
        let Some(creds) = self.session.snapshot().wifi else {
            return;
        };
        info!(
            "[wifi] retrying {:?} (attempt {})",
            creds.ssid,
            self.backoff.failures() + 1
        );
        let target = ConnectTarget::new(creds.ssid.as_str(), creds.password.as_str());
        let mode = self.station_mode();
        match self.connect_station(&target, mode, self.timings.connect_timeout) {
            Ok(()) => self.on_connected(&target.ssid),
            Err(reason) => {
                info!("[wifi] retry failed: {}", reason);
                self.fall_back_to_access_point(&target.ssid, &reason);
            }
        }
    }

    /// Switch to `mode` and run one bounded attempt.
    fn connect_station(
        &mut self,
        target: &ConnectTarget,
        mode: RadioMode,
        timeout: Duration,
    ) -> Result<(), FailureReason> {
        self.state = WifiConnectionState::Connecting;
        self.publish(WifiPhase::Connecting, Some(&target.ssid), None);
        self.refresh_status();

        if self.radio.mode() != mode {
            if let Err(e) = self.radio.set_mode(mode) {
                error!("[wifi] set mode {:?}: {}", mode, e);
                return Err(FailureReason::StartFailed(e.to_string()));
            }
        }
        self.attempt(target, timeout)
    }

    /// Poll until connected, failed, or `timeout`.
    fn attempt(&mut self, target: &ConnectTarget, timeout: Duration) -> Result<(), FailureReason> {
        self.flags.clear();
        self.radio
            .begin_connect(target)
            .map_err(|e| FailureReason::StartFailed(e.to_string()))?;

        let deadline = self.clock.now_ms() + timeout.as_millis() as Millis;
        loop {
            let events = self.flags.take();
            if let Some(kind) = events.disconnected {
                if kind.is_fatal_for_attempt() {
                    let _ = self.radio.disconnect();
                    return Err(FailureReason::from(kind));
                }
                debug!("[wifi] {:?} during attempt, reconnecting", kind);
                if let Err(e) = self.radio.begin_connect(target) {
                    debug!("[wifi] reconnect: {}", e);
                }
            }

            match self.radio.link_status() {
                LinkStatus::Connected => return Ok(()),
                LinkStatus::AuthFailed => {
                    let _ = self.radio.disconnect();
                    return Err(FailureReason::AuthFailed);
                }
                LinkStatus::NoApFound => {
                    let _ = self.radio.disconnect();
                    return Err(FailureReason::NoApFound);
                }
                LinkStatus::Idle | LinkStatus::Connecting | LinkStatus::Disconnected => {}
            }

            if deadline_reached(self.clock.now_ms(), deadline) {
                let _ = self.radio.disconnect();
                return Err(FailureReason::TimedOut);
            }
            self.clock.sleep(self.timings.poll_interval);
        }
    }

    // ==================== Transitions ====================

    fn on_connected(&mut self, ssid: &str) {
        self.backoff.reset();
        self.next_retry_at = None;
        self.rollback = None;

        let ip = self.radio.association().and_then(|a| a.ip);
        match ip {
            Some(ip) => info!("[wifi] connected to {:?}, ip {}", ssid, ip),
            None => info!("[wifi] connected to {:?}", ssid),
        }
        self.events
            .emit(status::event_with_detail(events::WIFI_STA_CONNECTED, ssid));
        self.publish(WifiPhase::Connected, Some(ssid), None);

        if self.ap_active {
            let at = self.clock.now_ms() + self.timings.ap_grace.as_millis() as Millis;
            self.ap_shutdown_at = Some(at);
            self.state = WifiConnectionState::TransitioningToSta;
        } else {
            self.ap_shutdown_at = None;
            self.state = WifiConnectionState::Connected;
        }
        self.refresh_status();
    }

    /// Grace window over: drop the AP and the portal.
    fn finish_sta_transition(&mut self) {
        info!("[wifi] grace window over, stopping access point");
        self.ap_shutdown_at = None;
        self.portal.stop();
        if let Err(e) = self.radio.stop_access_point() {
            warn!("[wifi] stop AP: {}", e);
        }
        if let Err(e) = self.radio.set_mode(RadioMode::Station) {
            warn!("[wifi] station-only mode: {}", e);
        }
        self.ap_active = false;
        self.ap_ip = None;
        self.state = WifiConnectionState::Connected;
    }

    fn on_link_lost(&mut self, kind: Option<DisconnectKind>) {
        let message = match kind {
            Some(DisconnectKind::Other(code)) => format!("Disconnect reason {}", code),
            Some(kind) => FailureReason::from(kind).message().to_string(),
            None => "Connection lost".to_string(),
        };
        warn!("[wifi] station link lost: {}", message);
        let lost_ssid = self.session.snapshot().wifi_ssid().map(str::to_string);
        let _ = self.radio.disconnect();

        self.enter_access_point_mode();
        self.publish(WifiPhase::Failed, lost_ssid.as_deref(), Some(&message));
        self.schedule_retry();
        self.events.emit(status::event(events::WIFI_CONFIG_MODE));
    }

    /// After a failed attempt: AP-only, failure published, retry scheduled.
    fn fall_back_to_access_point(&mut self, ssid: &str, reason: &FailureReason) {
        self.enter_access_point_mode();
        self.publish(WifiPhase::Failed, Some(ssid), Some(reason.message()));
        if self.session.snapshot().has_wifi_credentials() {
            self.schedule_retry();
        }
    }

    /// Force AP-only mode with the portal running.
    fn enter_access_point_mode(&mut self) {
        self.state = WifiConnectionState::AccessPointOnly;
        self.ap_shutdown_at = None;

        if let Err(e) = self.radio.set_mode(RadioMode::AccessPoint) {
            error!("[wifi] AP mode: {}", e);
            self.shut_down_portal();
            self.publish(WifiPhase::Failed, None, Some("Failed to start WiFi for access point"));
            self.events
                .emit(status::error("Failed to start WiFi for access point"));
            self.schedule_ap_retry();
            return;
        }

        if !self.ap_active {
            match self.radio.start_access_point(&self.ap) {
                Ok(ip) => {
                    info!("[wifi] access point {:?} up at {}", self.ap.ssid, ip);
                    self.ap_active = true;
                    self.ap_ip = Some(ip);
                }
                Err(e) => {
                    error!("[wifi] start AP: {}", e);
                    self.shut_down_portal();
                    self.publish(WifiPhase::Failed, None, Some("Failed to start access point"));
                    self.events
                        .emit(status::error("Failed to start access point"));
                    self.schedule_ap_retry();
                    return;
                }
            }
        }

        self.ap_retry_at = None;
        if let Some(ip) = self.ap_ip {
            if let Err(e) = self.portal.start(ip, &self.ap.ssid) {
                warn!("[portal] start failed: {}", e);
            }
        }
        let ssid = self.ap.ssid.clone();
        self.publish(WifiPhase::Ap, Some(&ssid), None);
        self.refresh_status();
    }

    fn shut_down_portal(&mut self) {
        self.portal.stop();
        self.ap_active = false;
        self.ap_ip = None;
    }

    fn schedule_ap_retry(&mut self) {
        let delay = self.timings.ap_retry_interval;
        self.ap_retry_at = Some(self.clock.now_ms() + delay.as_millis() as Millis);
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        self.next_retry_at = Some(self.clock.now_ms() + delay.as_millis() as Millis);
        info!("[wifi] next reconnect in {}s", delay.as_secs());
    }

    // ==================== Helpers ====================

    /// Keep the AP interface while it is serving the portal.
    fn station_mode(&self) -> RadioMode {
        if self.ap_active {
            RadioMode::AccessPointStation
        } else {
            RadioMode::Station
        }
    }

    fn snapshot_association(&self) -> Option<ConnectTarget> {
        let Association {
            ssid,
            bssid,
            channel,
            ..
        } = self.radio.association()?;
        let config = self.session.snapshot();
        let password = config
            .wifi
            .as_ref()
            .filter(|c| c.ssid == ssid)
            .map(|c| c.password.clone())
            .unwrap_or_default();
        Some(ConnectTarget {
            ssid,
            password,
            bssid,
            channel,
        })
    }

    fn persist_credentials(&mut self, target: &ConnectTarget) {
        let creds = WifiCredentials::unchecked(target.ssid.as_str(), target.password.as_str());
        self.session.update(|c| c.set_wifi(Some(creds)));
        self.persist_or_warn(
            |store, config| store.save_wifi(config.wifi.as_ref()),
            "Failed to save WiFi credentials",
        );
    }

    /// Store write failures keep the in-memory value and raise a warning.
    fn persist_or_warn(
        &self,
        f: impl FnOnce(&mut ConfigStore, &DeviceConfig) -> Result<(), StoreError>,
        detail: &str,
    ) {
        if let Err(e) = self.session.persist(f) {
            warn!("[wifi] {}: {}", detail, e);
            self.events.emit(status::warning(detail));
        }
    }

    fn publish(&mut self, phase: WifiPhase, ssid: Option<&str>, message: Option<&str>) {
        if let Some(event) = self.publisher.update(phase, ssid, message) {
            debug!("[wifi] state {}", phase.as_str());
            self.events.emit_wifi_state(event);
        }
    }

    fn refresh_status(&self) {
        let association = if self.state.is_station_connected() {
            self.radio.association()
        } else {
            None
        };
        let mut status = self.status.lock().unwrap();
        status.state = self.state;
        status.station_ssid = association.as_ref().map(|a| a.ssid.clone());
        status.station_ip = association.and_then(|a| a.ip);
        status.ap_active = self.ap_active;
        status.ap_ssid = self.ap_active.then(|| self.ap.ssid.clone());
        status.ap_ip = self.ap_ip;
        status.published = self.publisher.last().clone();
    }
}
