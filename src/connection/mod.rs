//! Chat socket connection lifecycle.
//!
//! Provides:
//! - [`ConnectionLifecycleManager`] - one credential-aware socket, guarded dispatch
//! - [`EventHandlerCatalog`] - store handlers the manager routes events to
//! - [`Transport`] / [`WebSocketTransport`] - how sockets are opened
//! - [`WatchStateStore`] - observable connection status for the UI

mod backoff;
mod credentials;
mod endpoint;
mod events;
mod handlers;
mod manager;
mod state;
mod transport;
mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::ReconnectPolicy;
pub use credentials::{CredentialProvider, CredentialSource, Credentials};
pub use endpoint::{EndpointConfig, DEFAULT_SOCKET_PATH};
pub use events::{Frame, Inbound, ServerEvent, SocketId, TransportEvent};
pub use handlers::{
    ConnectionIssue, ConnectionPhase, ConnectionStateStore, ConversationHandlers,
    EventHandlerCatalog, Ignore, MessageHandlers,
};
pub use manager::{ConnectionError, ConnectionLifecycleManager, ManagerHandle};
pub use state::{ConnectionStatus, WatchStateStore};
pub use transport::{ConnectRequest, Connection, Listener, Transport, TransportError};
pub use websocket::{WebSocketConnection, WebSocketTransport};
