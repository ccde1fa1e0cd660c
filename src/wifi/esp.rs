//! ESP-IDF radio backend.
//!
//! Wraps `EspWifi` directly rather than `BlockingWifi`: connection is started
//! with `connect()` and completion is observed by polling, so the controller
//! owns the timeout. Station disconnect reasons are forwarded into
//! [`WifiEventFlags`] by a system event loop subscription held for the
//! radio's lifetime.

use super::{
    ApSettings, Association, AuthMode, ConnectTarget, LinkStatus, RadioError, RadioMode,
    ScanEntry, WifiEventFlags, WifiRadio,
};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::ipv4::{self, Mask, RouterConfiguration, Subnet};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
    WifiDriver, WifiEvent,
};
use esp_idf_sys as sys;
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// [`WifiRadio`] over the ESP-IDF WiFi driver.
pub struct EspWifiRadio {
    wifi: EspWifi<'static>,
    mode: RadioMode,
    client: ClientConfiguration,
    ap: AccessPointConfiguration,
    connecting: bool,
    mac: [u8; 6],
    _wifi_events: EspSubscription<'static, System>,
}

impl EspWifiRadio {
    /// Bring up the driver with the soft-AP netif bound to `ap_ip`/24.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        ap_ip: Ipv4Addr,
        flags: Arc<WifiEventFlags>,
    ) -> Result<Self, RadioError> {
        let driver = WifiDriver::new(modem, sysloop.clone(), nvs)?;

        let ap_netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway: ap_ip,
                    mask: Mask(24),
                },
                dhcp_enabled: true,
                dns: Some(ap_ip),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        })?;
        let sta_netif = EspNetif::new(NetifStack::Sta)?;
        let wifi = EspWifi::wrap_all(driver, sta_netif, ap_netif)?;

        let wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| {
            if let WifiEvent::StaDisconnected(disconnected) = event {
                flags.notify_disconnected(disconnected.reason() as u16);
            }
        })?;

        let mac = wifi.sta_netif().get_mac()?;
        Ok(Self {
            wifi,
            mode: RadioMode::Off,
            client: ClientConfiguration::default(),
            ap: AccessPointConfiguration::default(),
            connecting: false,
            mac,
            _wifi_events: wifi_events,
        })
    }

    fn apply_configuration(&mut self) -> Result<(), RadioError> {
        let config = match self.mode {
            RadioMode::Off => Configuration::None,
            RadioMode::Station => Configuration::Client(self.client.clone()),
            RadioMode::AccessPoint => Configuration::AccessPoint(self.ap.clone()),
            RadioMode::AccessPointStation => {
                Configuration::Mixed(self.client.clone(), self.ap.clone())
            }
        };
        self.wifi.set_configuration(&config)?;
        Ok(())
    }

    fn ap_record() -> Option<sys::wifi_ap_record_t> {
        let mut record: sys::wifi_ap_record_t = Default::default();
        // SAFETY: record is a valid out-pointer for the call's duration
        let err = unsafe { sys::esp_wifi_sta_get_ap_info(&mut record) };
        (err == sys::ESP_OK).then_some(record)
    }
}

impl WifiRadio for EspWifiRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        if mode == self.mode {
            return Ok(());
        }
        debug!("[wifi] radio mode {:?} -> {:?}", self.mode, mode);
        if !mode.has_station() {
            self.connecting = false;
        }
        self.mode = mode;

        if mode == RadioMode::Off {
            self.wifi.stop()?;
            return Ok(());
        }
        self.apply_configuration()?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }

    fn start_access_point(&mut self, settings: &ApSettings) -> Result<Ipv4Addr, RadioError> {
        if !self.mode.has_access_point() {
            return Err(RadioError::NotReady);
        }
        self.ap = AccessPointConfiguration {
            ssid: settings
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials)?,
            password: settings
                .password
                .as_str()
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials)?,
            channel: settings.channel,
            auth_method: if settings.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            max_connections: 4,
            ..Default::default()
        };
        self.apply_configuration()?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        let ip = self.wifi.ap_netif().get_ip_info()?.ip;
        info!("[wifi] soft-AP {:?} on {}", settings.ssid, ip);
        Ok(ip)
    }

    fn stop_access_point(&mut self) -> Result<(), RadioError> {
        // Dropping the AP half happens on the next set_mode(Station)
        Ok(())
    }

    fn begin_connect(&mut self, target: &ConnectTarget) -> Result<(), RadioError> {
        if !self.mode.has_station() {
            return Err(RadioError::NotReady);
        }
        self.client = ClientConfiguration {
            ssid: target
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials)?,
            password: target
                .password
                .as_str()
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials)?,
            auth_method: if target.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            bssid: target.bssid,
            channel: target.channel,
            ..Default::default()
        };
        self.apply_configuration()?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.connecting = true;
        self.wifi.connect()?;
        Ok(())
    }

    fn link_status(&mut self) -> LinkStatus {
        let associated = self.wifi.is_connected().unwrap_or(false);
        // The netif comes up on association, before DHCP finishes
        let has_ip = self
            .wifi
            .sta_netif()
            .get_ip_info()
            .is_ok_and(|info| !info.ip.is_unspecified());
        match (associated, has_ip) {
            (true, true) => {
                self.connecting = false;
                LinkStatus::Connected
            }
            _ if self.connecting => LinkStatus::Connecting,
            (true, false) => LinkStatus::Connecting,
            (false, _) => LinkStatus::Disconnected,
        }
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.connecting = false;
        if self.mode.has_station() {
            if let Err(e) = self.wifi.disconnect() {
                // ESP_ERR_WIFI_NOT_CONNECT is expected when idle
                debug!("[wifi] disconnect: {:?}", e);
            }
        }
        Ok(())
    }

    fn association(&self) -> Option<Association> {
        if !self.wifi.is_connected().unwrap_or(false) {
            return None;
        }
        let record = Self::ap_record();
        let ip = self
            .wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified());
        Some(Association {
            ssid: self.client.ssid.as_str().to_string(),
            bssid: record.map(|r| r.bssid),
            channel: record.map(|r| r.primary),
            ip,
        })
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, RadioError> {
        if !self.mode.has_station() || !self.wifi.is_started().unwrap_or(false) {
            return Err(RadioError::NotReady);
        }
        let results = self
            .wifi
            .scan()
            .map_err(|e| RadioError::ScanFailed(format!("{:?}", e)))?;
        Ok(results
            .into_iter()
            .map(|ap| ScanEntry {
                ssid: ap.ssid.as_str().to_string(),
                bssid: ap.bssid,
                rssi: ap.signal_strength,
                channel: ap.channel,
                auth: auth_mode(ap.auth_method),
            })
            .collect())
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }
}

fn auth_mode(method: Option<AuthMethod>) -> AuthMode {
    match method {
        Some(AuthMethod::None) => AuthMode::Open,
        Some(AuthMethod::WEP) => AuthMode::Wep,
        Some(AuthMethod::WPA) => AuthMode::WpaPsk,
        Some(AuthMethod::WPA2Personal) => AuthMode::Wpa2Psk,
        Some(AuthMethod::WPAWPA2Personal) => AuthMode::WpaWpa2Psk,
        Some(AuthMethod::WPA2Enterprise) => AuthMode::Wpa2Enterprise,
        Some(AuthMethod::WPA3Personal) => AuthMode::Wpa3Psk,
        Some(AuthMethod::WPA2WPA3Personal) => AuthMode::Wpa2Wpa3Psk,
        Some(AuthMethod::WAPIPersonal) => AuthMode::WapiPsk,
        _ => AuthMode::Unknown,
    }
}

impl Drop for EspWifiRadio {
    fn drop(&mut self) {
        if let Err(e) = self.wifi.stop() {
            warn!("[wifi] stop on drop: {:?}", e);
        }
    }
}
