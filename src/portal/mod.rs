//! Captive portal.
//!
//! While the soft-AP is up every DNS name resolves to the AP address, so a
//! phone joining the network lands on the configuration page. The page and
//! the OS probe endpoints are served by the HTTP server in [`crate::web`];
//! this module owns the DNS side and the probe table.

mod dns;
mod probes;

pub use dns::{build_response, DnsResponder, DNS_PORT};
pub use probes::{classify_probe, Probe};

use log::{info, warn};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug)]
pub enum PortalError {
    /// DNS socket could not be bound.
    Bind(std::io::Error),
    Io(std::io::Error),
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "DNS bind failed: {}", e),
            Self::Io(e) => write!(f, "DNS I/O error: {}", e),
        }
    }
}

impl std::error::Error for PortalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(e) | Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PortalError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Lifecycle the WiFi controller drives: up exactly while the AP is up.
pub trait CaptivePortal: Send {
    /// Start (or restart, if `ip`/`ssid` changed) the portal.
    fn start(&mut self, ip: Ipv4Addr, ssid: &str) -> Result<(), PortalError>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// DNS-backed [`CaptivePortal`].
pub struct CaptivePortalService {
    port: u16,
    responder: Option<DnsResponder>,
    bound: Option<(Ipv4Addr, String)>,
}

impl CaptivePortalService {
    pub fn new() -> Self {
        Self::with_port(DNS_PORT)
    }

    /// Listen on a non-standard port (tests use 0 for an ephemeral one).
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            responder: None,
            bound: None,
        }
    }

    /// Port the DNS responder actually bound, while running.
    pub fn local_port(&self) -> Option<u16> {
        self.responder.as_ref().map(DnsResponder::local_port)
    }
}

impl Default for CaptivePortalService {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptivePortal for CaptivePortalService {
    fn start(&mut self, ip: Ipv4Addr, ssid: &str) -> Result<(), PortalError> {
        if self.responder.is_some() {
            if let Some((bound_ip, bound_ssid)) = &self.bound {
                if *bound_ip == ip && bound_ssid == ssid {
                    return Ok(());
                }
            }
            info!("[portal] AP changed, restarting");
            self.stop();
        }

        let responder = DnsResponder::start(ip, self.port)?;
        info!(
            "[portal] DNS answering *. -> {} on port {} (AP {:?})",
            ip,
            responder.local_port(),
            ssid
        );
        self.responder = Some(responder);
        self.bound = Some((ip, ssid.to_string()));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut responder) = self.responder.take() {
            responder.stop();
            info!("[portal] stopped");
        }
        self.bound = None;
    }

    fn is_active(&self) -> bool {
        self.responder.is_some()
    }
}

impl Drop for CaptivePortalService {
    fn drop(&mut self) {
        if self.responder.is_some() {
            warn!("[portal] dropped while active");
            self.stop();
        }
    }
}

/// Portal that only records calls, for controller tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingPortal {
    inner: std::sync::Arc<std::sync::Mutex<RecordingPortalState>>,
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingPortalState {
    pub active: Option<(Ipv4Addr, String)>,
    pub starts: usize,
    pub stops: usize,
}

#[cfg(test)]
impl RecordingPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<(Ipv4Addr, String)> {
        self.inner.lock().unwrap().active.clone()
    }

    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }
}

#[cfg(test)]
impl CaptivePortal for RecordingPortal {
    fn start(&mut self, ip: Ipv4Addr, ssid: &str) -> Result<(), PortalError> {
        let mut state = self.inner.lock().unwrap();
        if state.active.as_ref() != Some(&(ip, ssid.to_string())) {
            state.starts += 1;
            state.active = Some((ip, ssid.to_string()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.inner.lock().unwrap();
        if state.active.take().is_some() {
            state.stops += 1;
        }
    }

    fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active.is_some()
    }
}
