//! Registry of connected WebSocket clients.
//!
//! Each connection thread registers and gets a [`ClientId`] plus a receiver
//! for text addressed to it. The most recently connected client becomes the
//! "active" one that receives broadcast events.

use crate::command::ClientId;
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// Text queued for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Addressed to this client only.
    Reply(String),
    /// Taken from the broadcast queue; goes back there if never written.
    Event(String),
}

impl Outgoing {
    pub fn text(&self) -> &str {
        match self {
            Self::Reply(text) | Self::Event(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Reply(text) | Self::Event(text) => text,
        }
    }
}

#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU32,
    clients: Mutex<HashMap<ClientId, Sender<Outgoing>>>,
    active: Mutex<Option<ClientId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client and make it the active one.
    pub fn register(&self) -> (ClientId, Receiver<Outgoing>) {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel();
        self.clients.lock().unwrap().insert(id, tx);
        *self.active.lock().unwrap() = Some(id);
        info!("[ws] client {} connected", id);
        (id, rx)
    }

    /// Remove a client; clears the active handle if it pointed here.
    pub fn unregister(&self, id: ClientId) {
        if self.clients.lock().unwrap().remove(&id).is_some() {
            info!("[ws] client {} disconnected", id);
        }
        self.clear_active_if(id);
    }

    /// Queue text for one client. False if the client is gone.
    pub fn send_to(&self, id: ClientId, text: String) -> bool {
        let clients = self.clients.lock().unwrap();
        match clients.get(&id) {
            Some(tx) => tx.send(Outgoing::Reply(text)).is_ok(),
            None => false,
        }
    }

    pub fn active(&self) -> Option<ClientId> {
        *self.active.lock().unwrap()
    }

    /// Deliver to the active client. Gives the text back on failure.
    pub fn send_to_active(&self, text: String) -> Result<(), String> {
        let Some(id) = self.active() else {
            return Err(text);
        };
        let clients = self.clients.lock().unwrap();
        match clients.get(&id) {
            Some(tx) => tx
                .send(Outgoing::Event(text))
                .map_err(|e| e.0.into_text()),
            None => Err(text),
        }
    }

    /// Forget the active client if it is still `id`.
    pub fn clear_active_if(&self, id: ClientId) {
        let mut active = self.active.lock().unwrap();
        if *active == Some(id) {
            *active = None;
        }
    }

    /// Drop every client's channel; connection threads close their sockets.
    pub fn close_all(&self) {
        let drained: Vec<ClientId> = self.clients.lock().unwrap().drain().map(|(id, _)| id).collect();
        *self.active.lock().unwrap() = None;
        if !drained.is_empty() {
            info!("[ws] closed {} client(s)", drained.len());
        }
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.clients.lock().unwrap().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
