//! Watch-channel backed connection-state store.

use serde_json::Value;
use tokio::sync::watch;

use super::events::SocketId;
use super::handlers::{ConnectionIssue, ConnectionPhase, ConnectionStateStore};

/// Snapshot of the connection as observed by the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub socket: Option<SocketId>,
    /// The server sent `connection_ready` on the current socket.
    pub ready: bool,
    pub ready_payload: Option<Value>,
    pub reconnect_attempt: Option<u32>,
    pub last_issue: Option<ConnectionIssue>,
    pub last_disconnect_reason: Option<String>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

/// [`ConnectionStateStore`] that publishes a [`ConnectionStatus`].
pub struct WatchStateStore {
    tx: watch::Sender<ConnectionStatus>,
}

impl WatchStateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }
}

impl Default for WatchStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateStore for WatchStateStore {
    fn phase_changed(&self, phase: ConnectionPhase) {
        self.tx.send_modify(|status| {
            status.phase = phase;
            match phase {
                ConnectionPhase::Connected => {
                    status.reconnect_attempt = None;
                    status.last_issue = None;
                }
                ConnectionPhase::Connecting
                | ConnectionPhase::NoConnection
                | ConnectionPhase::Uninitialized => {
                    status.socket = None;
                    status.ready = false;
                    status.ready_payload = None;
                }
                ConnectionPhase::Reconnecting | ConnectionPhase::Failed => {
                    status.ready = false;
                }
            }
        });
    }

    fn connected(&self, socket: SocketId) {
        self.tx.send_modify(|status| status.socket = Some(socket));
    }

    fn disconnected(&self, reason: &str) {
        self.tx
            .send_modify(|status| status.last_disconnect_reason = Some(reason.to_string()));
    }

    fn issue(&self, issue: ConnectionIssue) {
        self.tx.send_modify(|status| status.last_issue = Some(issue));
    }

    fn reconnect_attempt(&self, attempt: u32) {
        self.tx
            .send_modify(|status| status.reconnect_attempt = Some(attempt));
    }

    fn reconnected(&self, _attempt: u32) {
        self.tx.send_modify(|status| status.reconnect_attempt = None);
    }

    fn ready(&self, payload: &Value) {
        self.tx.send_modify(|status| {
            status.ready = true;
            status.ready_payload = Some(payload.clone());
        });
    }
}
