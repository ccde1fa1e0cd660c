//! Cross-task access to the WiFi controller.
//!
//! The controller lives on its own task because a connection attempt blocks
//! for up to the connect timeout. Other tasks (the HTTP server mostly) talk
//! to it through a [`WifiHandle`]:
//!
//! - connect requests go through a queue of depth one guarded by a busy
//!   flag, so at most one attempt is queued or running;
//! - forget and scan go through a small control queue, scan with a reply
//!   channel and a bounded wait;
//! - status reads come from the shared snapshot and never block on the
//!   controller.

use super::error::WifiError;
use super::scan::NetworkInfo;
use super::state::{SharedWifiStatus, WifiStatus};
use super::{ConnectTarget, WifiStationController};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// How long a scan request waits for the controller.
pub const SCAN_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

const CONTROL_QUEUE_DEPTH: usize = 4;

enum ControlRequest {
    Forget,
    Scan(SyncSender<Result<Vec<NetworkInfo>, WifiError>>),
}

/// Cloneable client side.
#[derive(Clone)]
pub struct WifiHandle {
    connect_tx: SyncSender<ConnectTarget>,
    control_tx: SyncSender<ControlRequest>,
    busy: Arc<AtomicBool>,
    status: SharedWifiStatus,
    scan_timeout: Duration,
}

/// Controller side, drained by [`WifiStationController::service_requests`].
pub struct WifiRequests {
    connect_rx: Receiver<ConnectTarget>,
    control_rx: Receiver<ControlRequest>,
    busy: Arc<AtomicBool>,
}

/// Create a handle bound to `status` (from
/// [`WifiStationController::status_handle`]).
pub fn wifi_channel(status: SharedWifiStatus) -> (WifiHandle, WifiRequests) {
    let (connect_tx, connect_rx) = mpsc::sync_channel(1);
    let (control_tx, control_rx) = mpsc::sync_channel(CONTROL_QUEUE_DEPTH);
    let busy = Arc::new(AtomicBool::new(false));
    (
        WifiHandle {
            connect_tx,
            control_tx,
            busy: busy.clone(),
            status,
            scan_timeout: SCAN_REPLY_TIMEOUT,
        },
        WifiRequests {
            connect_rx,
            control_rx,
            busy,
        },
    )
}

impl WifiHandle {
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Queue a connection attempt. Returns once queued, not once connected.
    pub fn request_connect(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::EmptySsid);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WifiError::Busy);
        }

        match self.connect_tx.try_send(ConnectTarget::new(ssid, password)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.busy.store(false, Ordering::Release);
                Err(WifiError::Busy)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.busy.store(false, Ordering::Release);
                Err(WifiError::Stopped)
            }
        }
    }

    /// Queue a forget; the controller applies it on its next tick.
    pub fn forget(&self) -> Result<(), WifiError> {
        self.control_tx
            .try_send(ControlRequest::Forget)
            .map_err(|e| match e {
                TrySendError::Full(_) => WifiError::Unavailable,
                TrySendError::Disconnected(_) => WifiError::Stopped,
            })
    }

    /// Ask the controller to scan and wait for the result.
    ///
    /// A controller stuck in a connection attempt answers
    /// [`WifiError::Unavailable`] after the scan timeout.
    pub fn scan(&self) -> Result<Vec<NetworkInfo>, WifiError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.control_tx
            .try_send(ControlRequest::Scan(reply_tx))
            .map_err(|e| match e {
                TrySendError::Full(_) => WifiError::Unavailable,
                TrySendError::Disconnected(_) => WifiError::Stopped,
            })?;
        match reply_rx.recv_timeout(self.scan_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(WifiError::Unavailable),
            Err(RecvTimeoutError::Disconnected) => Err(WifiError::Stopped),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> WifiStatus {
        let mut status = self.status.lock().unwrap().clone();
        status.connect_in_progress = self.is_busy();
        status
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl WifiStationController {
    /// Handle queued requests. Returns true if anything was done.
    pub fn service_requests(&mut self, requests: &WifiRequests) -> bool {
        let mut handled = false;

        loop {
            match requests.control_rx.try_recv() {
                Ok(ControlRequest::Forget) => self.forget_credentials(),
                Ok(ControlRequest::Scan(reply)) => {
                    let result = self.scan_networks();
                    if reply.try_send(result).is_err() {
                        debug!("[wifi] scan requester gone");
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
            handled = true;
        }

        if let Ok(target) = requests.connect_rx.try_recv() {
            match self.set_credentials(&target.ssid, &target.password) {
                Ok(outcome) => info!("[wifi] connect request finished: {:?}", outcome),
                Err(e) => warn!("[wifi] connect request rejected: {}", e),
            }
            requests.busy.store(false, Ordering::Release);
            handled = true;
        }

        handled
    }

    /// Controller task body: serve requests and tick forever.
    pub fn run(mut self, requests: WifiRequests, tick: Duration) -> ! {
        self.initialize();
        loop {
            self.service_requests(&requests);
            self.process();
            self.clock().sleep(tick);
        }
    }
}
