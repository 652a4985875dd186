//! Connection lifecycle management.
//!
//! [`ConnectionLifecycleManager`] keeps exactly one socket whose identity
//! follows the current credential and routes every event of that socket to
//! the handler catalog. Two guards protect shared state from stale events:
//!
//! - the mounted flag, flipped synchronously on unmount, and
//! - the socket generation: events tagged with any id other than the
//!   current socket's are dropped.
//!
//! On top of that, a replaced socket's [`Listener`] is detached before the
//! socket is disconnected, so it cannot enqueue anything new.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::credentials::{CredentialProvider, Credentials};
use super::endpoint::EndpointConfig;
use super::events::{Inbound, SocketId, TransportEvent};
use super::handlers::{ConnectionIssue, ConnectionPhase, EventHandlerCatalog};
use super::transport::{ConnectRequest, Connection, Listener, Transport, TransportError};

/// Error type for manager operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("No socket is open")]
    NotConnected,

    #[error("Connection manager is unmounted")]
    Unmounted,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Owns the connection state. Not thread-safe by itself; run it inside one
/// task via [`ConnectionLifecycleManager::spawn`].
pub struct ConnectionLifecycleManager {
    endpoint: EndpointConfig,
    transport: Arc<dyn Transport>,
    catalog: EventHandlerCatalog,
    inbox: mpsc::UnboundedSender<Inbound>,
    mounted: Arc<AtomicBool>,
    socket: Option<Box<dyn Connection>>,
    listener: Option<Listener>,
    last_credential: Option<String>,
    next_socket: u64,
    phase: ConnectionPhase,
    torn_down: bool,
}

impl ConnectionLifecycleManager {
    /// Create a manager and the receiver its sockets deliver events into.
    pub fn new(
        endpoint: EndpointConfig,
        transport: Arc<dyn Transport>,
        catalog: EventHandlerCatalog,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let manager = Self {
            endpoint,
            transport,
            catalog,
            inbox,
            mounted: Arc::new(AtomicBool::new(true)),
            socket: None,
            listener: None,
            last_credential: None,
            next_socket: 0,
            phase: ConnectionPhase::Uninitialized,
            torn_down: false,
        };
        (manager, inbox_rx)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Id of the socket currently considered live.
    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket.as_ref().map(|s| s.id())
    }

    /// Re-evaluate the connection against the latest credentials.
    pub fn evaluate(&mut self, credentials: &Credentials) {
        if self.torn_down {
            return;
        }

        let previous = std::mem::replace(&mut self.last_credential, credentials.token.clone());

        if !credentials.auth_ready {
            debug!("Auth bootstrap pending, holding off on connecting");
            self.discard_socket("auth bootstrap pending");
            self.set_phase(ConnectionPhase::NoConnection);
            return;
        }

        let Some(url) = self.endpoint.socket_url() else {
            debug!("No socket endpoint configured");
            self.discard_socket("no endpoint configured");
            self.set_phase(ConnectionPhase::NoConnection);
            return;
        };

        if let Some(socket) = &self.socket {
            let rotated = previous != credentials.token;
            let signed_out_while_connected =
                credentials.token.is_none() && socket.is_connected();
            if rotated || signed_out_while_connected {
                info!(
                    socket_id = %socket.id(),
                    rotated,
                    signed_out = credentials.token.is_none(),
                    "Credential changed, replacing socket"
                );
                self.discard_socket("credential changed");
            }
        }

        if self.socket.is_none() {
            self.open_socket(url, credentials.token.clone());
        }
    }

    /// Handle one event from a socket. Returns `true` if it reached the
    /// handlers.
    pub fn dispatch(&mut self, inbound: Inbound) -> bool {
        let Inbound { socket, event } = inbound;

        if !self.is_mounted() {
            trace!(socket_id = %socket, event = %event.kind(), "Dropping event after unmount");
            return false;
        }
        if self.current_socket() != Some(socket) {
            debug!(socket_id = %socket, event = %event.kind(), "Dropping event from superseded socket");
            return false;
        }

        match event {
            TransportEvent::Connect => {
                info!(socket_id = %socket, "Connected");
                self.set_phase(ConnectionPhase::Connected);
                self.guarded("connect", |c| c.state.connected(socket));
            }
            TransportEvent::Disconnect { reason } => {
                warn!(socket_id = %socket, reason = %reason, "Disconnected");
                self.set_phase(ConnectionPhase::Reconnecting);
                self.guarded("disconnect", |c| c.state.disconnected(&reason));
            }
            TransportEvent::ConnectError { message } => {
                self.guarded("connect_error", |c| {
                    c.state.issue(ConnectionIssue::Connect(message))
                });
            }
            TransportEvent::AuthError { message } => {
                warn!(socket_id = %socket, error = %message, "Authentication rejected");
                self.guarded("auth_error", |c| c.state.issue(ConnectionIssue::Auth(message)));
                self.set_phase(ConnectionPhase::Failed);
            }
            TransportEvent::Error { message } => {
                self.guarded("error", |c| {
                    c.state.issue(ConnectionIssue::Transport(message))
                });
            }
            TransportEvent::ReconnectAttempt { attempt } => {
                self.set_phase(ConnectionPhase::Reconnecting);
                self.guarded("reconnect_attempt", |c| c.state.reconnect_attempt(attempt));
            }
            TransportEvent::ReconnectError { message } => {
                self.guarded("reconnect_error", |c| {
                    c.state.issue(ConnectionIssue::Reconnect(message))
                });
            }
            TransportEvent::ReconnectFailed => {
                error!(socket_id = %socket, "Reconnection attempts exhausted");
                self.guarded("reconnect_failed", |c| {
                    c.state.issue(ConnectionIssue::ReconnectFailed)
                });
                self.set_phase(ConnectionPhase::Failed);
            }
            TransportEvent::Reconnect { attempt } => {
                info!(socket_id = %socket, attempt, "Reconnected");
                self.set_phase(ConnectionPhase::Connected);
                self.guarded("reconnect", |c| c.state.reconnected(attempt));
            }
            TransportEvent::Server { name, payload } => {
                trace!(socket_id = %socket, event = %name, "Server event");
                self.guarded(&name, |c| {
                    c.dispatch_server(&name, &payload);
                });
            }
        }
        true
    }

    /// Send a named event on the current socket.
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), ConnectionError> {
        if !self.is_mounted() {
            return Err(ConnectionError::Unmounted);
        }
        let socket = self.socket.as_ref().ok_or(ConnectionError::NotConnected)?;
        socket.emit(event, payload)?;
        Ok(())
    }

    /// Stop accepting events, detach listeners and disconnect. Idempotent.
    pub fn teardown(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.discard_socket("unmount");
        // the mounted guard is already down; publish the final phase directly
        if self.phase != ConnectionPhase::NoConnection {
            self.phase = ConnectionPhase::NoConnection;
            self.guarded("teardown", |c| c.state.phase_changed(ConnectionPhase::NoConnection));
        }
        info!("Connection manager unmounted");
    }

    /// Drop the current socket and connect again with `credentials`, even if
    /// they did not change. This is the manual retry after `Failed`.
    pub fn reconnect(&mut self, credentials: &Credentials) {
        if self.torn_down || !self.is_mounted() {
            return;
        }
        info!(phase = %self.phase, "Manual reconnect requested");
        self.discard_socket("manual reconnect");
        self.evaluate(credentials);
    }

    /// Run the manager in its own task, re-evaluating on every credential
    /// change.
    pub fn spawn(
        endpoint: EndpointConfig,
        transport: Arc<dyn Transport>,
        catalog: EventHandlerCatalog,
        credentials: CredentialProvider,
    ) -> (ManagerHandle, JoinHandle<()>) {
        let (manager, inbox) = Self::new(endpoint, transport, catalog);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = ManagerHandle {
            commands: commands_tx,
            mounted: manager.mounted.clone(),
        };
        let task = tokio::spawn(run(manager, inbox, credentials, commands_rx));
        (handle, task)
    }

    fn open_socket(&mut self, url: String, token: Option<String>) {
        self.next_socket += 1;
        let id = SocketId(self.next_socket);
        let listener = Listener::new(id, self.inbox.clone());

        info!(socket_id = %id, url = %url, anonymous = token.is_none(), "Opening socket");
        let request = ConnectRequest {
            socket_id: id,
            url,
            token,
        };
        let socket = self.transport.connect(request, listener.clone());

        self.listener = Some(listener);
        self.socket = Some(socket);
        self.set_phase(ConnectionPhase::Connecting);
    }

    fn discard_socket(&mut self, why: &str) {
        if let Some(listener) = self.listener.take() {
            listener.detach();
        }
        if let Some(mut socket) = self.socket.take() {
            debug!(socket_id = %socket.id(), reason = %why, "Discarding socket");
            socket.disconnect();
        }
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase == phase {
            return;
        }
        debug!(from = %self.phase, to = %phase, "Connection phase");
        self.phase = phase;
        if self.is_mounted() {
            self.guarded("phase", |c| c.state.phase_changed(phase));
        }
    }

    fn guarded(&self, event: &str, f: impl FnOnce(&EventHandlerCatalog)) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(&self.catalog))) {
            error!(event = %event, panic = %panic_message(panic.as_ref()), "Event handler panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

enum Command {
    Emit {
        event: String,
        payload: Value,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Reconnect,
    Unmount,
}

/// Handle to a spawned manager. Dropping every clone unmounts it.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    mounted: Arc<AtomicBool>,
}

impl ManagerHandle {
    /// Unmount the manager. Events already in flight become no-ops
    /// immediately; the socket is closed by the manager task. Idempotent.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            debug!("Unmount requested");
        }
        let _ = self.commands.send(Command::Unmount);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Open a fresh socket with the current credentials. Used to retry after
    /// the connection reached `Failed`.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Send a named event on the current socket.
    pub async fn emit(
        &self,
        event: impl Into<String>,
        payload: Value,
    ) -> Result<(), ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Emit {
                event: event.into(),
                payload,
                reply,
            })
            .map_err(|_| ConnectionError::Unmounted)?;
        rx.await.map_err(|_| ConnectionError::Unmounted)?
    }
}

async fn run(
    mut manager: ConnectionLifecycleManager,
    mut inbox: mpsc::UnboundedReceiver<Inbound>,
    mut credentials: CredentialProvider,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let initial = credentials.borrow_and_update().clone();
    manager.evaluate(&initial);
    let mut provider_open = true;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Emit { event, payload, reply }) => {
                    let _ = reply.send(manager.emit(&event, payload));
                }
                Some(Command::Reconnect) => {
                    let current = credentials.borrow().clone();
                    manager.reconnect(&current);
                }
                Some(Command::Unmount) | None => break,
            },

            changed = credentials.changed(), if provider_open => {
                if changed.is_ok() {
                    let current = credentials.borrow_and_update().clone();
                    manager.evaluate(&current);
                } else {
                    debug!("Credential provider closed; keeping current socket");
                    provider_open = false;
                }
            }

            Some(inbound) = inbox.recv() => {
                manager.dispatch(inbound);
            }
        }
    }

    manager.teardown();
}
