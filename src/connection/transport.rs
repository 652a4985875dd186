//! Transport seam between the lifecycle manager and a concrete socket.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use super::events::{Inbound, SocketId, TransportEvent};

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Socket is closed")]
    Closed,

    #[error("Invalid socket url: {0}")]
    InvalidUrl(String),

    #[error("Invalid auth token: {0}")]
    InvalidToken(String),
}

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub socket_id: SocketId,
    pub url: String,
    /// Auth token; `None` asks for an anonymous connection.
    pub token: Option<String>,
}

/// Event registration for one socket instance.
///
/// Transports report every event through [`Listener::deliver`]. Once
/// [`Listener::detach`] has run, delivery is a silent no-op, so a replaced
/// socket can never reach the manager again.
#[derive(Debug, Clone)]
pub struct Listener {
    socket: SocketId,
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Inbound>>>>,
}

impl Listener {
    pub fn new(socket: SocketId, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self {
            socket,
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// Forward an event. Returns `false` if the listener was detached or the
    /// manager is gone.
    pub fn deliver(&self, event: TransportEvent) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        tx.send(Inbound {
            socket: self.socket,
            event,
        })
        .is_ok()
    }

    /// Unregister. Idempotent; affects every clone.
    pub fn detach(&self) {
        self.tx.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.tx.lock().is_some()
    }
}

/// A live connection handle.
pub trait Connection: Send {
    fn id(&self) -> SocketId;

    /// Whether the transport currently has an open socket.
    fn is_connected(&self) -> bool;

    /// Send a named event. Transports may buffer while reconnecting.
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Close the connection and stop reconnecting. Idempotent.
    fn disconnect(&mut self);
}

/// Opens connections.
pub trait Transport: Send + Sync {
    /// Start connecting. The returned handle is live immediately; progress is
    /// reported through `listener`.
    fn connect(&self, request: ConnectRequest, listener: Listener) -> Box<dyn Connection>;
}
