//! WebSocket command transport.
//!
//! Socket handling lives in [`WsServer`](super::WsServer); this is the part
//! that decides what happens to frames and events:
//!
//! - text frames are enqueued exactly like UART lines, and oversize or
//!   queue-full errors go back to the client that sent the frame;
//! - asynchronous events are broadcast to the active client only. A failed
//!   broadcast puts the event back at the head of the queue and the pump
//!   backs off briefly before retrying. Events a session took but never
//!   wrote to its socket are put back the same way when it ends.

use crate::clock::{deadline_reached, Clock, Millis};
use crate::command::{ClientId, CommandSender, Origin};
use crate::outbound::Outbox;
use crate::status;
use super::clients::Outgoing;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pause after a failed broadcast.
pub const BROADCAST_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Events delivered per pump call.
const MAX_BROADCAST_BATCH: usize = 8;

/// Why a WebSocket session was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Transport is UART; WebSocket sessions are not accepted.
    Disabled,
}

impl Rejection {
    pub fn http_status(self) -> u16 {
        match self {
            Self::Disabled => 503,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Disabled => "WebSocket disabled",
        }
    }
}

/// A client session accepted by [`WebSocketTransport::open_client`].
pub struct ClientSession {
    pub id: ClientId,
    /// Text addressed to this client (replies, broadcasts).
    pub outgoing: Receiver<Outgoing>,
}

impl ClientSession {
    /// Broadcast events still waiting in this session's channel, oldest
    /// first. Replies are discarded.
    ///
    /// Call after [`WebSocketTransport::close_client`] so nothing new arrives.
    pub fn take_undelivered_events(&self) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(item) = self.outgoing.try_recv() {
            if let Outgoing::Event(text) = item {
                events.push(text);
            }
        }
        events
    }
}

pub struct WebSocketTransport {
    commands: CommandSender,
    outbox: Arc<Outbox>,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
    retry_at: Mutex<Option<Millis>>,
}

impl WebSocketTransport {
    pub fn new(commands: CommandSender, outbox: Arc<Outbox>, clock: Arc<dyn Clock>) -> Self {
        Self {
            commands,
            outbox,
            clock,
            enabled: AtomicBool::new(false),
            retry_at: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Start accepting sessions and frames.
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::AcqRel) {
            *self.retry_at.lock().unwrap() = None;
            info!("[ws] enabled");
        }
    }

    /// Stop producing: close every session and drop undelivered events.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            self.outbox.clients().close_all();
            self.outbox.ws_event_queue().clear();
            info!("[ws] disabled");
        }
    }

    /// Register a new client. It becomes the broadcast target and is sent
    /// the last `wifi_state` right away.
    pub fn open_client(&self) -> Result<ClientSession, Rejection> {
        if !self.is_enabled() {
            return Err(Rejection::Disabled);
        }
        let clients = self.outbox.clients();
        let (id, outgoing) = clients.register();
        if let Some(state) = self.outbox.cached_wifi_state() {
            clients.send_to(id, state);
        }
        Ok(ClientSession { id, outgoing })
    }

    /// The client closed or its socket failed.
    pub fn close_client(&self, id: ClientId) {
        self.outbox.clients().unregister(id);
    }

    /// Put events a closed session never wrote back at the head of the
    /// broadcast queue, keeping their order. Dropped while disabled.
    pub fn requeue_undelivered(&self, events: Vec<String>) {
        if events.is_empty() {
            return;
        }
        if !self.is_enabled() {
            debug!("[ws] dropping {} undelivered event(s), transport disabled", events.len());
            return;
        }
        debug!("[ws] requeueing {} undelivered event(s)", events.len());
        let queue = self.outbox.ws_event_queue();
        for text in events.into_iter().rev() {
            queue.requeue_front(text);
        }
    }

    /// Handle one text frame. Returns true if a command was enqueued.
    pub fn on_text(&self, id: ClientId, text: &str) -> bool {
        if !self.is_enabled() {
            debug!("[ws] frame from {} ignored, transport disabled", id);
            return false;
        }
        match self.commands.submit(Origin::WebSocket(id), text) {
            Ok(()) => true,
            Err(e) => {
                warn!("[ws] dropping command from {}: {}", id, e);
                self.outbox
                    .clients()
                    .send_to(id, status::error(&e.to_string()));
                false
            }
        }
    }

    /// Deliver queued events to the active client.
    ///
    /// Returns the number delivered. Nothing is sent while the retry delay
    /// after a failure is running.
    pub fn pump_broadcast(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let now = self.clock.now_ms();
        {
            let mut retry_at = self.retry_at.lock().unwrap();
            match *retry_at {
                Some(at) if !deadline_reached(now, at) => return 0,
                Some(_) => *retry_at = None,
                None => {}
            }
        }

        let queue = self.outbox.ws_event_queue();
        let clients = self.outbox.clients();
        let mut delivered = 0;
        while delivered < MAX_BROADCAST_BATCH {
            let Some(text) = queue.try_pop() else {
                break;
            };
            match clients.send_to_active(text) {
                Ok(()) => delivered += 1,
                Err(text) => {
                    queue.requeue_front(text);
                    if let Some(stale) = clients.active() {
                        debug!("[ws] broadcast to {} failed, clearing", stale);
                        clients.clear_active_if(stale);
                    }
                    *self.retry_at.lock().unwrap() =
                        Some(now + BROADCAST_RETRY_DELAY.as_millis() as Millis);
                    break;
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::{command_channel, CommandReceiver, MAX_COMMAND_LEN};
    use crate::config::TransportMode;
    use crate::outbound::EventSink;
    use crate::session::SessionState;
    use crate::store::{ConfigStore, MemoryStore};
    use crate::web::ClientRegistry;

    struct Harness {
        ws: WebSocketTransport,
        outbox: Arc<Outbox>,
        clock: ManualClock,
        rx: CommandReceiver,
    }

    fn harness(capacity: usize) -> Harness {
        let session = SessionState::load(ConfigStore::new(MemoryStore::new()));
        session.update(|c| c.transport = TransportMode::Websocket);
        let outbox = Arc::new(Outbox::new(session, Arc::new(ClientRegistry::new())));
        let clock = ManualClock::new();
        let (tx, rx) = command_channel(capacity);
        let ws = WebSocketTransport::new(tx, outbox.clone(), Arc::new(clock.clone()));
        ws.enable();
        Harness {
            ws,
            outbox,
            clock,
            rx,
        }
    }

    fn error_message(text: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        value["message"].as_str().unwrap().to_string()
    }

    // ==================== Session Tests ====================

    #[test]
    fn test_disabled_refuses_sessions() {
        let h = harness(4);
        h.ws.disable();
        let rejection = h.ws.open_client().err().unwrap();
        assert_eq!(rejection.http_status(), 503);
        assert_eq!(rejection.message(), "WebSocket disabled");
    }

    #[test]
    fn test_new_client_gets_cached_wifi_state() {
        let h = harness(4);
        h.outbox
            .emit_wifi_state(r#"{"event":"wifi_state","state":"ap"}"#.into());
        h.outbox.ws_event_queue().clear();

        let session = h.ws.open_client().unwrap();
        assert_eq!(
            session.outgoing.try_recv().unwrap().into_text(),
            r#"{"event":"wifi_state","state":"ap"}"#
        );
    }

    #[test]
    fn test_disable_closes_clients_and_drops_events() {
        let h = harness(4);
        let session = h.ws.open_client().unwrap();
        h.outbox.emit("pending".into());

        h.ws.disable();
        assert!(h.outbox.clients().is_empty());
        assert!(h.outbox.ws_event_queue().is_empty());
        assert!(matches!(
            session.outgoing.try_recv(),
            Err(std::sync::mpsc::TryRecvError::Disconnected)
        ));
    }

    // ==================== Frame Tests ====================

    #[test]
    fn test_text_frame_enqueued_with_client_origin() {
        let h = harness(4);
        let session = h.ws.open_client().unwrap();
        assert!(h.ws.on_text(session.id, r#"{"device":"mouse","action":"click"}"#));

        let msg = h.rx.try_recv().unwrap();
        assert_eq!(msg.origin(), Origin::WebSocket(session.id));
        assert!(session.outgoing.try_recv().is_err());
    }

    #[test]
    fn test_errors_go_to_sender_only() {
        let h = harness(1);
        let a = h.ws.open_client().unwrap();
        let b = h.ws.open_client().unwrap();

        assert!(!h.ws.on_text(a.id, &"x".repeat(MAX_COMMAND_LEN + 1)));
        assert_eq!(
            error_message(&a.outgoing.try_recv().unwrap().into_text()),
            "Input too long"
        );

        assert!(h.ws.on_text(a.id, "first"));
        assert!(!h.ws.on_text(a.id, "second"));
        assert_eq!(
            error_message(&a.outgoing.try_recv().unwrap().into_text()),
            "Command queue full"
        );
        assert!(b.outgoing.try_recv().is_err());
        assert_eq!(h.rx.try_recv().unwrap().as_str(), "first");
    }

    #[test]
    fn test_frames_ignored_while_disabled() {
        let h = harness(4);
        let session = h.ws.open_client().unwrap();
        h.ws.disable();
        assert!(!h.ws.on_text(session.id, "late"));
        assert!(h.rx.try_recv().is_none());
    }

    // ==================== Broadcast Tests ====================

    #[test]
    fn test_broadcast_reaches_active_client() {
        let h = harness(4);
        let older = h.ws.open_client().unwrap();
        let active = h.ws.open_client().unwrap();
        h.outbox.emit(status::event("ready"));

        assert_eq!(h.ws.pump_broadcast(), 1);
        assert_eq!(
            active.outgoing.try_recv().unwrap().into_text(),
            status::event("ready")
        );
        assert!(older.outgoing.try_recv().is_err());
    }

    #[test]
    fn test_failed_broadcast_requeued_and_retried() {
        let h = harness(4);
        let gone = h.ws.open_client().unwrap();
        drop(gone.outgoing);
        h.outbox.emit("e1".into());
        h.outbox.emit("e2".into());

        assert_eq!(h.ws.pump_broadcast(), 0);
        assert_eq!(h.outbox.clients().active(), None);
        assert_eq!(h.outbox.ws_event_queue().len(), 2);

        // Still backing off
        let fresh = h.ws.open_client().unwrap();
        assert_eq!(h.ws.pump_broadcast(), 0);

        h.clock.advance(BROADCAST_RETRY_DELAY);
        assert_eq!(h.ws.pump_broadcast(), 2);
        assert_eq!(fresh.outgoing.try_recv().unwrap().into_text(), "e1");
        assert_eq!(fresh.outgoing.try_recv().unwrap().into_text(), "e2");
    }

    #[test]
    fn test_unwritten_events_requeued_when_session_ends() {
        let h = harness(4);
        let session = h.ws.open_client().unwrap();
        h.outbox.emit("e1".into());
        h.outbox.emit("e2".into());
        assert_eq!(h.ws.pump_broadcast(), 2);
        h.outbox.clients().send_to(session.id, status::ok());
        h.outbox.emit("e3".into());

        // Socket died before the session wrote anything
        h.ws.close_client(session.id);
        h.ws.requeue_undelivered(session.take_undelivered_events());
        assert_eq!(h.outbox.ws_event_queue().len(), 3);

        h.clock.advance(BROADCAST_RETRY_DELAY);
        let fresh = h.ws.open_client().unwrap();
        assert_eq!(h.ws.pump_broadcast(), 3);
        let received: Vec<String> = fresh
            .outgoing
            .try_iter()
            .map(Outgoing::into_text)
            .collect();
        assert_eq!(received, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_unwritten_events_dropped_after_disable() {
        let h = harness(4);
        let session = h.ws.open_client().unwrap();
        h.outbox.emit("e1".into());
        assert_eq!(h.ws.pump_broadcast(), 1);

        h.ws.close_client(session.id);
        let undelivered = session.take_undelivered_events();
        assert_eq!(undelivered, vec!["e1"]);
        h.ws.disable();
        h.ws.requeue_undelivered(undelivered);
        assert!(h.outbox.ws_event_queue().is_empty());
    }

    #[test]
    fn test_broadcast_waits_for_a_client() {
        let h = harness(4);
        h.outbox.emit("early".into());
        assert_eq!(h.ws.pump_broadcast(), 0);
        assert_eq!(h.outbox.ws_event_queue().len(), 1);

        h.clock.advance(BROADCAST_RETRY_DELAY);
        let session = h.ws.open_client().unwrap();
        assert_eq!(h.ws.pump_broadcast(), 1);
        assert_eq!(session.outgoing.try_recv().unwrap().into_text(), "early");
    }
}
