//! Outbound routing of replies and asynchronous events.
//!
//! Replies to a command go back to the transport (and WebSocket client) that
//! delivered it. Asynchronous events go to whichever transport is active:
//! the UART line queue, or the WebSocket broadcast queue drained by the
//! broadcast pump.

use crate::command::Origin;
use crate::config::TransportMode;
use crate::session::SessionState;
use crate::web::ClientRegistry;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Default capacity of each outbound queue.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Receiver of asynchronous events.
pub trait EventSink: Send + Sync {
    fn emit(&self, text: String);

    /// Emit a `wifi_state` event. Sinks that greet new clients cache it.
    fn emit_wifi_state(&self, text: String) {
        self.emit(text);
    }
}

/// Bounded FIFO of outbound text messages.
///
/// A message that could not be delivered can be put back at the front with
/// [`requeue_front`](Self::requeue_front) so ordering is preserved.
pub struct EventQueue {
    name: &'static str,
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
    available: Condvar,
}

impl EventQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
        }
    }

    /// Append a message. Returns false (message dropped) when full.
    pub fn push(&self, text: String) -> bool {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            warn!("[out] {} queue full, dropping message", self.name);
            return false;
        }
        queue.push_back(text);
        self.available.notify_one();
        true
    }

    /// Put an undelivered message back at the head.
    ///
    /// Always succeeds; if the queue is full the newest message is evicted
    /// instead.
    pub fn requeue_front(&self, text: String) {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            queue.pop_back();
            warn!("[out] {} queue full on requeue, evicted newest", self.name);
        }
        queue.push_front(text);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<String> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Wait up to `timeout` for a message.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let queue = self.inner.lock().unwrap();
        let (mut queue, _) = self
            .available
            .wait_timeout_while(queue, timeout, |q| q.is_empty())
            .unwrap();
        queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

/// Routes replies and events to the right transport.
pub struct Outbox {
    session: Arc<SessionState>,
    uart: EventQueue,
    ws_events: EventQueue,
    clients: Arc<ClientRegistry>,
    last_wifi_state: Mutex<Option<String>>,
}

impl Outbox {
    pub fn new(session: Arc<SessionState>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            session,
            uart: EventQueue::new("uart", EVENT_QUEUE_CAPACITY),
            ws_events: EventQueue::new("ws", EVENT_QUEUE_CAPACITY),
            clients,
            last_wifi_state: Mutex::new(None),
        }
    }

    /// Send a command reply back to where the command came from.
    pub fn reply(&self, origin: Origin, text: String) {
        match origin {
            Origin::Uart => {
                self.uart.push(text);
            }
            Origin::WebSocket(id) => {
                if !self.clients.send_to(id, text) {
                    debug!("[out] client {} gone, reply dropped", id);
                }
            }
        }
    }

    /// Lines waiting to be written to the serial port.
    pub fn uart_queue(&self) -> &EventQueue {
        &self.uart
    }

    /// Events waiting to be broadcast to the active WebSocket client.
    pub fn ws_event_queue(&self) -> &EventQueue {
        &self.ws_events
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Most recent `wifi_state` event, replayed to newly connected clients.
    pub fn cached_wifi_state(&self) -> Option<String> {
        self.last_wifi_state.lock().unwrap().clone()
    }
}

impl EventSink for Outbox {
    fn emit(&self, text: String) {
        match self.session.transport() {
            TransportMode::Uart => self.uart.push(text),
            TransportMode::Websocket => self.ws_events.push(text),
        };
    }

    fn emit_wifi_state(&self, text: String) {
        *self.last_wifi_state.lock().unwrap() = Some(text.clone());
        self.emit(text);
    }
}

/// Sink that records events, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Parsed events whose `event` field equals `name`.
    pub fn named(&self, name: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| serde_json::from_str::<serde_json::Value>(e).ok())
            .filter(|v| v["event"] == name)
            .collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, text: String) {
        self.events.lock().unwrap().push(text);
    }
}
