//! In-memory transport and recording stores for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::events::{SocketId, TransportEvent};
use super::handlers::{
    ConnectionIssue, ConnectionPhase, ConnectionStateStore, ConversationHandlers,
    EventHandlerCatalog, MessageHandlers,
};
use super::transport::{ConnectRequest, Connection, Listener, Transport, TransportError};

/// One socket the scripted transport opened.
#[derive(Clone)]
pub struct OpenedSocket {
    pub request: ConnectRequest,
    pub listener: Listener,
    pub connected: Arc<AtomicBool>,
    pub disconnects: Arc<AtomicUsize>,
    pub emitted: Arc<Mutex<Vec<(String, Value)>>>,
}

impl OpenedSocket {
    pub fn token(&self) -> Option<&str> {
        self.request.token.as_deref()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Pretend the transport connected.
    pub fn connect(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        self.listener.deliver(TransportEvent::Connect)
    }

    pub fn fire(&self, event: TransportEvent) -> bool {
        self.listener.deliver(event)
    }
}

/// Transport that records every connect and lets tests fire events.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    opened: Arc<Mutex<Vec<OpenedSocket>>>,
}

impl ScriptedTransport {
    pub fn socket(&self, index: usize) -> OpenedSocket {
        self.opened.lock()[index].clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

struct ScriptedConnection {
    id: SocketId,
    connected: Arc<AtomicBool>,
    disconnects: Arc<AtomicUsize>,
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Connection for ScriptedConnection {
    fn id(&self) -> SocketId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.emitted.lock().push((event.to_string(), payload));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    fn connect(&self, request: ConnectRequest, listener: Listener) -> Box<dyn Connection> {
        let opened = OpenedSocket {
            request: request.clone(),
            listener,
            connected: Arc::new(AtomicBool::new(false)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            emitted: Arc::new(Mutex::new(Vec::new())),
        };
        let connection = ScriptedConnection {
            id: request.socket_id,
            connected: opened.connected.clone(),
            disconnects: opened.disconnects.clone(),
            emitted: opened.emitted.clone(),
        };
        self.opened.lock().push(opened);
        Box::new(connection)
    }
}

/// Store that records every call as a string.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<String>>,
    phases: Mutex<Vec<ConnectionPhase>>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn phases(&self) -> Vec<ConnectionPhase> {
        self.phases.lock().clone()
    }

    pub fn last_phase(&self) -> Option<ConnectionPhase> {
        self.phases.lock().last().copied()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

impl ConnectionStateStore for RecordingStore {
    fn phase_changed(&self, phase: ConnectionPhase) {
        self.phases.lock().push(phase);
    }

    fn connected(&self, socket: SocketId) {
        self.record(format!("connected {socket}"));
    }

    fn disconnected(&self, reason: &str) {
        self.record(format!("disconnected {reason}"));
    }

    fn issue(&self, issue: ConnectionIssue) {
        self.record(format!("issue {issue}"));
    }

    fn reconnect_attempt(&self, attempt: u32) {
        self.record(format!("reconnect_attempt {attempt}"));
    }

    fn reconnected(&self, attempt: u32) {
        self.record(format!("reconnected {attempt}"));
    }

    fn ready(&self, payload: &Value) {
        self.record(format!("ready {payload}"));
    }
}

impl ConversationHandlers for RecordingStore {
    fn conversation_list(&self, payload: &Value) {
        self.record(format!("conversation_list {payload}"));
    }

    fn conversation_renamed(&self, payload: &Value) {
        self.record(format!("conversation_renamed {payload}"));
    }
}

impl MessageHandlers for RecordingStore {
    fn chat_update(&self, payload: &Value) {
        self.record(format!("chat_update {payload}"));
    }

    fn chat_result(&self, payload: &Value) {
        self.record(format!("chat_result {payload}"));
    }

    fn chat_error(&self, payload: &Value) {
        self.record(format!("chat_error {payload}"));
    }
}

/// Catalog whose three stores are the same recorder.
pub fn recording_catalog() -> (Arc<RecordingStore>, EventHandlerCatalog) {
    let store = Arc::new(RecordingStore::default());
    let catalog = EventHandlerCatalog::new(store.clone(), store.clone(), store.clone());
    (store, catalog)
}
