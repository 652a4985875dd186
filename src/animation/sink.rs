//! Content sinks fed by the animator.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Receives progressively revealed text for a message.
///
/// `text` is always a prefix of the full buffered text, and successive calls
/// for the same message never shrink.
pub trait ContentSink: Send + 'static {
    fn update(&mut self, message_id: &str, text: &str);
}

impl<F> ContentSink for F
where
    F: FnMut(&str, &str) + Send + 'static,
{
    fn update(&mut self, message_id: &str, text: &str) {
        self(message_id, text)
    }
}

/// A revealed-text update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub message_id: String,
    pub text: String,
}

/// Sender half of the content bus.
#[derive(Clone)]
pub struct ContentSender {
    tx: broadcast::Sender<ContentUpdate>,
}

impl ContentSender {
    /// Publish an update. Returns an error if nobody is subscribed.
    pub fn send(&self, update: ContentUpdate) -> Result<(), BusError> {
        self.tx.send(update).map_err(|_| BusError::Closed)?;
        Ok(())
    }
}

impl ContentSink for ContentSender {
    fn update(&mut self, message_id: &str, text: &str) {
        // no subscribers is fine; the consumer may attach later
        let _ = self.send(ContentUpdate {
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
    }
}

/// Receiver half of the content bus.
pub struct ContentReceiver {
    rx: broadcast::Receiver<ContentUpdate>,
}

impl ContentReceiver {
    /// Receive the next update.
    pub async fn recv(&mut self) -> Result<ContentUpdate, BusError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        })
    }

    /// Try to receive an update without waiting.
    pub fn try_recv(&mut self) -> Result<Option<ContentUpdate>, BusError> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        }
    }
}

/// Broadcast fan-out of revealed text to any number of consumers.
pub struct ContentBus {
    tx: broadcast::Sender<ContentUpdate>,
}

impl ContentBus {
    /// Create a new content bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Get a sender, usable as the animator's sink.
    pub fn sender(&self) -> ContentSender {
        ContentSender {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to updates.
    pub fn subscribe(&self) -> ContentReceiver {
        ContentReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ContentBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Channel closed")]
    Closed,
    #[error("Lagged behind by {0} updates")]
    Lagged(u64),
}
