//! Event catalog for the chat socket.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation number of a connection instance.
///
/// Every socket the manager creates gets a fresh, strictly increasing id.
/// Events carry the id of the socket that produced them, which is how stale
/// events from a replaced socket are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something a transport reports about one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect,
    Disconnect { reason: String },
    ConnectError { message: String },
    AuthError { message: String },
    Error { message: String },
    ReconnectAttempt { attempt: u32 },
    ReconnectError { message: String },
    ReconnectFailed,
    Reconnect { attempt: u32 },
    /// A named event pushed by the server.
    Server { name: String, payload: Value },
}

impl TransportEvent {
    pub fn server(name: impl Into<String>, payload: Value) -> Self {
        Self::Server {
            name: name.into(),
            payload,
        }
    }

    /// Short name, for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
            Self::AuthError { .. } => "auth_error",
            Self::Error { .. } => "error",
            Self::ReconnectAttempt { .. } => "reconnect_attempt",
            Self::ReconnectError { .. } => "reconnect_error",
            Self::ReconnectFailed => "reconnect_failed",
            Self::Reconnect { .. } => "reconnect",
            Self::Server { name, .. } => name,
        }
    }
}

/// An event tagged with the socket that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub socket: SocketId,
    pub event: TransportEvent,
}

/// Domain events the server pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    ConnectionReady,
    ConversationList,
    InitialHistory,
    NewConversationCreated,
    ConversationDeleted,
    ConversationCleared,
    ConversationRenamed,
    ConversationPinStatusChanged,
    StatusUpdate,
    ChatUpdate,
    ChatResult,
    ChatError,
    EmailConfirmationResult,
    ConversationUpdatedAfterEdit,
}

impl ServerEvent {
    pub const ALL: [ServerEvent; 14] = [
        ServerEvent::ConnectionReady,
        ServerEvent::ConversationList,
        ServerEvent::InitialHistory,
        ServerEvent::NewConversationCreated,
        ServerEvent::ConversationDeleted,
        ServerEvent::ConversationCleared,
        ServerEvent::ConversationRenamed,
        ServerEvent::ConversationPinStatusChanged,
        ServerEvent::StatusUpdate,
        ServerEvent::ChatUpdate,
        ServerEvent::ChatResult,
        ServerEvent::ChatError,
        ServerEvent::EmailConfirmationResult,
        ServerEvent::ConversationUpdatedAfterEdit,
    ];

    /// Wire name of the event.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectionReady => "connection_ready",
            Self::ConversationList => "conversation_list",
            Self::InitialHistory => "initial_history",
            Self::NewConversationCreated => "new_conversation_created",
            Self::ConversationDeleted => "conversation_deleted",
            Self::ConversationCleared => "conversation_cleared",
            Self::ConversationRenamed => "conversation_renamed",
            Self::ConversationPinStatusChanged => "conversation_pin_status_changed",
            Self::StatusUpdate => "status_update",
            Self::ChatUpdate => "chat_update",
            Self::ChatResult => "chat_result",
            Self::ChatError => "chat_error",
            Self::EmailConfirmationResult => "email_confirmation_result",
            Self::ConversationUpdatedAfterEdit => "conversation_updated_after_edit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON text frame exchanged over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}
