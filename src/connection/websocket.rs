//! WebSocket transport.
//!
//! One background task per connection dials, pumps frames, and redials with
//! bounded exponential backoff. Frames are JSON text messages of the form
//! `{"event": "<name>", "data": <payload>}`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{self, handshake::client::Request};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::events::{Frame, SocketId, TransportEvent};
use super::transport::{ConnectRequest, Connection, Listener, Transport, TransportError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    policy: ReconnectPolicy,
}

impl WebSocketTransport {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, request: ConnectRequest, listener: Listener) -> Box<dyn Connection> {
        let connected = Arc::new(AtomicBool::new(false));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let id = request.socket_id;

        let task = tokio::spawn(drive(
            request,
            self.policy.clone(),
            listener,
            connected.clone(),
            out_rx,
            stop_rx,
        ));

        Box::new(WebSocketConnection {
            id,
            connected,
            out_tx,
            stop_tx,
            task: Some(task),
        })
    }
}

/// Handle to one WebSocket connection task.
pub struct WebSocketConnection {
    id: SocketId,
    connected: Arc<AtomicBool>,
    out_tx: mpsc::UnboundedSender<Frame>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Connection for WebSocketConnection {
    fn id(&self) -> SocketId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.out_tx
            .send(Frame::new(event, payload))
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&mut self) {
        if self.task.take().is_none() {
            return;
        }
        debug!(socket_id = %self.id, "Disconnecting socket");
        self.connected.store(false, Ordering::SeqCst);
        // the task closes the socket gracefully on its own
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Why the frame pump returned.
enum Closed {
    ByClient,
    Remote(String),
}

fn handshake(request: &ConnectRequest) -> Result<Request, TransportError> {
    let mut handshake = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    if let Some(token) = &request.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::InvalidToken(e.to_string()))?;
        handshake.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(handshake)
}

fn is_auth_rejection(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::Http(response) => matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ),
        _ => false,
    }
}

async fn drive(
    request: ConnectRequest,
    policy: ReconnectPolicy,
    listener: Listener,
    connected: Arc<AtomicBool>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut stop: watch::Receiver<bool>,
) {
    let id = request.socket_id;
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            if !policy.allows(attempt) {
                warn!(socket_id = %id, attempts = attempt - 1, "Giving up reconnecting");
                listener.deliver(TransportEvent::ReconnectFailed);
                return;
            }
            let delay = policy.delay_for(attempt);
            debug!(socket_id = %id, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            listener.deliver(TransportEvent::ReconnectAttempt { attempt });
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => return,
            }
        }

        let handshake_request = match handshake(&request) {
            Ok(req) => req,
            Err(e) => {
                // retrying cannot help; both cases end the socket
                warn!(socket_id = %id, error = %e, "Cannot build handshake");
                let message = e.to_string();
                match e {
                    TransportError::InvalidToken(_) => {
                        listener.deliver(TransportEvent::AuthError { message });
                    }
                    _ => {
                        listener.deliver(TransportEvent::ConnectError { message });
                        listener.deliver(TransportEvent::ReconnectFailed);
                    }
                }
                return;
            }
        };

        let result = tokio::select! {
            result = connect_async(handshake_request) => result,
            _ = stop.changed() => return,
        };

        match result {
            Ok((socket, _response)) => {
                info!(socket_id = %id, url = %request.url, "Socket connected");
                connected.store(true, Ordering::SeqCst);
                listener.deliver(TransportEvent::Connect);
                if attempt > 0 {
                    listener.deliver(TransportEvent::Reconnect { attempt });
                }

                let closed = pump(socket, id, &listener, &mut outbound, &mut stop).await;
                connected.store(false, Ordering::SeqCst);
                match closed {
                    Closed::ByClient => return,
                    Closed::Remote(reason) => {
                        warn!(socket_id = %id, reason = %reason, "Socket dropped");
                        listener.deliver(TransportEvent::Disconnect { reason });
                        attempt = 1;
                    }
                }
            }
            Err(err) if is_auth_rejection(&err) => {
                warn!(socket_id = %id, error = %err, "Server rejected credentials");
                listener.deliver(TransportEvent::AuthError {
                    message: err.to_string(),
                });
                return;
            }
            Err(err) => {
                let message = err.to_string();
                if attempt == 0 {
                    warn!(socket_id = %id, error = %message, "Connect failed");
                    listener.deliver(TransportEvent::ConnectError { message });
                } else {
                    warn!(socket_id = %id, attempt, error = %message, "Reconnect failed");
                    listener.deliver(TransportEvent::ReconnectError { message });
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn pump(
    socket: Socket,
    id: SocketId,
    listener: &Listener,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    stop: &mut watch::Receiver<bool>,
) -> Closed {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            _ = stop.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Closed::ByClient;
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    return Closed::ByClient;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(socket_id = %id, event = %frame.event, error = %e, "Dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    return Closed::Remote(e.to_string());
                }
            }

            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => {
                        listener.deliver(TransportEvent::server(frame.event, frame.data));
                    }
                    Err(e) => {
                        listener.deliver(TransportEvent::Error {
                            message: format!("malformed frame: {e}"),
                        });
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "server closed the connection".to_string());
                    return Closed::Remote(reason);
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return Closed::Remote(e.to_string()),
                None => return Closed::Remote("stream ended".to_string()),
            },
        }
    }
}
