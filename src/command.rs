//! The command channel between transport producers and the BLE consumer.
//!
//! A bounded FIFO of fixed-size [`CommandMessage`]s. Producers never block:
//! a full queue is reported back to the sender as a status error and the
//! command is dropped.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Maximum command payload in bytes.
pub const MAX_COMMAND_LEN: usize = 512;

/// Default channel capacity.
pub const COMMAND_QUEUE_CAPACITY: usize = 8;

/// Identifies one WebSocket connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which transport (and client) delivered a command. Replies go back here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Uart,
    WebSocket(ClientId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue is at capacity; the command was dropped.
    Full,
    /// Payload exceeds [`MAX_COMMAND_LEN`].
    TooLong { len: usize },
    /// Consumer side was dropped.
    Closed,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Command queue full"),
            Self::TooLong { .. } => write!(f, "Input too long"),
            Self::Closed => write!(f, "Command queue closed"),
        }
    }
}

impl std::error::Error for EnqueueError {}

/// One command, copied by value across the queue boundary.
#[derive(Clone)]
pub struct CommandMessage {
    origin: Origin,
    len: usize,
    payload: [u8; MAX_COMMAND_LEN],
}

impl CommandMessage {
    pub fn new(origin: Origin, text: &str) -> Result<Self, EnqueueError> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_COMMAND_LEN {
            return Err(EnqueueError::TooLong { len: bytes.len() });
        }
        let mut payload = [0u8; MAX_COMMAND_LEN];
        payload[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            origin,
            len: bytes.len(),
            payload,
        })
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn as_str(&self) -> &str {
        // Constructed from &str, so always valid UTF-8
        std::str::from_utf8(&self.payload[..self.len]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMessage")
            .field("origin", &self.origin)
            .field("text", &self.as_str())
            .finish()
    }
}

/// Create a bounded command channel.
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half. Cheap to clone; one clone per transport.
#[derive(Clone)]
pub struct CommandSender {
    tx: SyncSender<CommandMessage>,
}

impl CommandSender {
    /// Non-blocking enqueue.
    pub fn try_send(&self, message: CommandMessage) -> Result<(), EnqueueError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Disconnected(_) => EnqueueError::Closed,
        })
    }

    /// Build a message from `text` and enqueue it.
    pub fn submit(&self, origin: Origin, text: &str) -> Result<(), EnqueueError> {
        self.try_send(CommandMessage::new(origin, text)?)
    }
}

/// Consumer half, owned by the BLE task.
pub struct CommandReceiver {
    rx: Receiver<CommandMessage>,
}

impl CommandReceiver {
    /// Wait up to `timeout` for the next command.
    ///
    /// Returns `Ok(None)` on timeout and `Err(Closed)` once every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<CommandMessage>, EnqueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EnqueueError::Closed),
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<CommandMessage> {
        self.rx.try_recv().ok()
    }
}


#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use ble_hid_bridge_macros::tap_test;

    #[tap_test]
    fn command_channel_fifo_across_threads() {
        let (tx, rx) = command_channel(COMMAND_QUEUE_CAPACITY);
        let producer = std::thread::spawn(move || {
            for i in 0..COMMAND_QUEUE_CAPACITY {
                tx.submit(Origin::Uart, &i.to_string()).unwrap();
            }
        });
        producer.join().unwrap();
        for i in 0..COMMAND_QUEUE_CAPACITY {
            let msg = rx.recv_timeout(Duration::from_millis(100)).unwrap().unwrap();
            assert_eq!(msg.as_str(), i.to_string());
        }
    }
}
