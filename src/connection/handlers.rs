//! Handler catalog supplied by the application stores.
//!
//! The manager never interprets payloads; it routes each server event to
//! the matching method here.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::events::{ServerEvent, SocketId};

/// Lifecycle phase of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Uninitialized,
    NoConnection,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::NoConnection => "no connection",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A non-fatal problem surfaced to the connection-state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionIssue {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Authentication rejected: {0}")]
    Auth(String),
    #[error("Socket error: {0}")]
    Transport(String),
    #[error("Reconnect failed: {0}")]
    Reconnect(String),
    #[error("Gave up reconnecting")]
    ReconnectFailed,
}

impl ConnectionIssue {
    /// Whether the user needs to sign in again rather than wait for a retry.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Connection-state store.
pub trait ConnectionStateStore: Send + Sync {
    fn phase_changed(&self, phase: ConnectionPhase);

    fn connected(&self, _socket: SocketId) {}

    fn disconnected(&self, _reason: &str) {}

    fn issue(&self, _issue: ConnectionIssue) {}

    fn reconnect_attempt(&self, _attempt: u32) {}

    fn reconnected(&self, _attempt: u32) {}

    /// The server finished its per-connection setup.
    fn ready(&self, _payload: &Value) {}
}

/// Conversation store handlers.
#[allow(unused_variables)]
pub trait ConversationHandlers: Send + Sync {
    fn conversation_list(&self, payload: &Value) {}
    fn initial_history(&self, payload: &Value) {}
    fn new_conversation_created(&self, payload: &Value) {}
    fn conversation_deleted(&self, payload: &Value) {}
    fn conversation_cleared(&self, payload: &Value) {}
    fn conversation_renamed(&self, payload: &Value) {}
    fn conversation_pin_status_changed(&self, payload: &Value) {}
}

/// Message store handlers.
#[allow(unused_variables)]
pub trait MessageHandlers: Send + Sync {
    fn status_update(&self, payload: &Value) {}
    fn chat_update(&self, payload: &Value) {}
    fn chat_result(&self, payload: &Value) {}
    fn chat_error(&self, payload: &Value) {}
    fn email_confirmation_result(&self, payload: &Value) {}
    fn conversation_updated_after_edit(&self, payload: &Value) {}
}

/// Handlers that ignore everything. Useful when a store is not wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ignore;

impl ConversationHandlers for Ignore {}
impl MessageHandlers for Ignore {}

/// The full set of handlers the manager dispatches to.
#[derive(Clone)]
pub struct EventHandlerCatalog {
    pub state: Arc<dyn ConnectionStateStore>,
    pub conversations: Arc<dyn ConversationHandlers>,
    pub messages: Arc<dyn MessageHandlers>,
}

impl EventHandlerCatalog {
    pub fn new(
        state: Arc<dyn ConnectionStateStore>,
        conversations: Arc<dyn ConversationHandlers>,
        messages: Arc<dyn MessageHandlers>,
    ) -> Self {
        Self {
            state,
            conversations,
            messages,
        }
    }

    /// Route a server event by name. Returns `false` for names outside the
    /// catalog.
    pub fn dispatch_server(&self, name: &str, payload: &Value) -> bool {
        let Some(event) = ServerEvent::from_name(name) else {
            debug!(event = %name, "Ignoring unknown server event");
            return false;
        };

        match event {
            ServerEvent::ConnectionReady => self.state.ready(payload),
            ServerEvent::ConversationList => self.conversations.conversation_list(payload),
            ServerEvent::InitialHistory => self.conversations.initial_history(payload),
            ServerEvent::NewConversationCreated => {
                self.conversations.new_conversation_created(payload)
            }
            ServerEvent::ConversationDeleted => self.conversations.conversation_deleted(payload),
            ServerEvent::ConversationCleared => self.conversations.conversation_cleared(payload),
            ServerEvent::ConversationRenamed => self.conversations.conversation_renamed(payload),
            ServerEvent::ConversationPinStatusChanged => {
                self.conversations.conversation_pin_status_changed(payload)
            }
            ServerEvent::StatusUpdate => self.messages.status_update(payload),
            ServerEvent::ChatUpdate => self.messages.chat_update(payload),
            ServerEvent::ChatResult => self.messages.chat_result(payload),
            ServerEvent::ChatError => self.messages.chat_error(payload),
            ServerEvent::EmailConfirmationResult => {
                self.messages.email_confirmation_result(payload)
            }
            ServerEvent::ConversationUpdatedAfterEdit => {
                self.messages.conversation_updated_after_edit(payload)
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_rejection_needs_reauth() {
        assert!(ConnectionIssue::Auth("401".into()).needs_reauth());
        assert!(!ConnectionIssue::ReconnectFailed.needs_reauth());
        assert!(!ConnectionIssue::Connect("refused".into()).needs_reauth());
    }

    #[test]
    fn test_unknown_server_event_is_not_routed() {
        let catalog = EventHandlerCatalog::new(
            Arc::new(crate::connection::state::WatchStateStore::new()),
            Arc::new(Ignore),
            Arc::new(Ignore),
        );
        assert!(catalog.dispatch_server("chat_update", &Value::Null));
        assert!(!catalog.dispatch_server("chat_updated", &Value::Null));
    }
}
