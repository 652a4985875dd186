//! Message handlers that feed streamed chat text into the animator.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::animation::AnimatorHandle;
use crate::connection::MessageHandlers;

/// Stream id used when the server does not name the message.
const FALLBACK_MESSAGE_ID: &str = "assistant";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatUpdatePayload {
    message_id: Option<String>,
    text_chunk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatResultPayload {
    message_id: Option<String>,
}

/// [`MessageHandlers`] decorator that drives an [`AnimatorHandle`].
///
/// - `chat_update` starts a stream for a new message id and feeds `textChunk`
/// - `chat_result` completes the stream
/// - `chat_error` stops it, flushing whatever arrived
///
/// Every call is forwarded to `inner` afterwards.
///
/// Chunks that name the message that just finished are dropped, so a late or
/// duplicate `chat_update` cannot restart it and shrink the shown text.
pub struct StreamingMessageHandler {
    animator: AnimatorHandle,
    inner: Arc<dyn MessageHandlers>,
    streams: Mutex<Streams>,
}

#[derive(Default)]
struct Streams {
    active: Option<String>,
    finished: Option<String>,
}

impl Streams {
    fn finish(&mut self) -> bool {
        match self.active.take() {
            Some(id) => {
                self.finished = Some(id);
                true
            }
            None => false,
        }
    }
}

impl StreamingMessageHandler {
    pub fn new(animator: AnimatorHandle, inner: Arc<dyn MessageHandlers>) -> Self {
        Self {
            animator,
            inner,
            streams: Mutex::new(Streams::default()),
        }
    }

    pub fn animator(&self) -> &AnimatorHandle {
        &self.animator
    }

    fn parse<T: for<'de> Deserialize<'de> + Default>(event: &str, payload: &Value) -> T {
        match T::deserialize(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(event = %event, error = %e, "Unexpected payload shape");
                T::default()
            }
        }
    }
}

impl MessageHandlers for StreamingMessageHandler {
    fn status_update(&self, payload: &Value) {
        self.inner.status_update(payload);
    }

    fn chat_update(&self, payload: &Value) {
        let update: ChatUpdatePayload = Self::parse("chat_update", payload);

        if let Some(chunk) = update.text_chunk.filter(|c| !c.is_empty()) {
            let mut streams = self.streams.lock();
            let late = update.message_id.is_some() && update.message_id == streams.finished;

            if late {
                debug!(message_id = ?update.message_id, "Dropping chunk for finished message");
            } else {
                let id = update
                    .message_id
                    .or_else(|| streams.active.clone())
                    .unwrap_or_else(|| FALLBACK_MESSAGE_ID.to_string());

                if streams.active.as_deref() != Some(id.as_str()) {
                    debug!(message_id = %id, "New streamed message");
                    self.animator.start_streaming(id.clone());
                    streams.active = Some(id);
                }
                self.animator.process_chunk(chunk);
            }
        }

        self.inner.chat_update(payload);
    }

    fn chat_result(&self, payload: &Value) {
        let result: ChatResultPayload = Self::parse("chat_result", payload);
        {
            let mut streams = self.streams.lock();
            let matches = match (&result.message_id, streams.active.as_ref()) {
                (Some(id), Some(current)) => id == current,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if matches {
                self.animator.complete_stream();
                streams.finish();
            }
        }
        self.inner.chat_result(payload);
    }

    fn chat_error(&self, payload: &Value) {
        if self.streams.lock().finish() {
            self.animator.stop_streaming();
        }
        self.inner.chat_error(payload);
    }

    fn email_confirmation_result(&self, payload: &Value) {
        self.inner.email_confirmation_result(payload);
    }

    fn conversation_updated_after_edit(&self, payload: &Value) {
        self.inner.conversation_updated_after_edit(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationConfig;
    use crate::connection::testing::{recording_catalog, RecordingStore, ScriptedTransport};
    use crate::connection::{
        ConnectionLifecycleManager, CredentialSource, Credentials, EndpointConfig,
        EventHandlerCatalog, TransportEvent,
    };
    use serde_json::json;
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn bridge() -> (Calls, Arc<RecordingStore>, StreamingMessageHandler) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let captured = calls.clone();
        let (animator, _task) = AnimatorHandle::spawn(
            AnimationConfig::default(),
            move |id: &str, text: &str| captured.lock().push((id.to_string(), text.to_string())),
        );
        let inner = Arc::new(RecordingStore::default());
        let handler = StreamingMessageHandler::new(animator, inner.clone());
        (calls, inner, handler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_animated_and_forwarded() {
        let (calls, inner, handler) = bridge();
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "Hello, "}));
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "world"}));
        handler.chat_result(&json!({"messageId": "m1"}));

        tokio::time::sleep(Duration::from_secs(1)).await;

        let calls = calls.lock();
        assert_eq!(calls.last().cloned(), Some(("m1".into(), "Hello, world".into())));
        assert!(calls.iter().all(|(id, _)| id == "m1"));
        assert_eq!(inner.calls().len(), 3);
        assert!(!handler.animator().is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_message_id_flushes_previous() {
        let (calls, _inner, handler) = bridge();
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "first answer"}));
        handler.chat_update(&json!({"messageId": "m2", "textChunk": "second"}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let calls = calls.lock();
        let last_m1 = calls.iter().rev().find(|(id, _)| id == "m1").unwrap();
        assert_eq!(last_m1.1, "first answer");
        assert_eq!(calls.last().unwrap(), &("m2".to_string(), "second".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_flushes_partial_text() {
        let (calls, _inner, handler) = bridge();
        let text = "partial ".repeat(40);
        handler.chat_update(&json!({"messageId": "m1", "textChunk": text}));
        handler.chat_error(&json!({"error": "model overloaded"}));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.lock().last().unwrap().1, text);
        assert!(handler.animator().current_streaming_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_chunk_for_finished_message_is_dropped() {
        let (calls, inner, handler) = bridge();
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "Hello world"}));
        handler.chat_result(&json!({"messageId": "m1"}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        handler.chat_update(&json!({"messageId": "m1", "textChunk": "!"}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        {
            let calls = calls.lock();
            assert_eq!(calls.last().unwrap(), &("m1".to_string(), "Hello world".to_string()));
            let mut last_len = 0;
            for (_, text) in calls.iter() {
                assert!(text.len() >= last_len, "shown text shrank to {text:?}");
                last_len = text.len();
            }
        }
        // the store still sees the late update
        assert_eq!(inner.calls().len(), 3);

        // a new message still streams
        handler.chat_update(&json!({"messageId": "m2", "textChunk": "next"}));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.lock().last().unwrap(), &("m2".to_string(), "next".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_chunk_after_error_is_dropped() {
        let (calls, _inner, handler) = bridge();
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "partial answer"}));
        handler.chat_error(&json!({"messageId": "m1"}));
        handler.chat_update(&json!({"messageId": "m1", "textChunk": "x"}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.lock().last().unwrap().1, "partial answer");
        assert!(handler.animator().current_streaming_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_is_forwarded_only() {
        let (calls, inner, handler) = bridge();
        handler.chat_update(&json!("just a string"));
        handler.chat_result(&json!({"messageId": "unknown"}));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(calls.lock().is_empty());
        assert_eq!(inner.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_to_screen() {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let captured = calls.clone();
        let (animator, _animator_task) = AnimatorHandle::spawn(
            AnimationConfig::default(),
            move |id: &str, text: &str| captured.lock().push((id.to_string(), text.to_string())),
        );

        let (store, base) = recording_catalog();
        let messages = Arc::new(StreamingMessageHandler::new(animator, store.clone()));
        let catalog = EventHandlerCatalog::new(base.state, base.conversations, messages);

        let transport = ScriptedTransport::default();
        let source = CredentialSource::new(Credentials::signed_in("A"));
        let (handle, _task) = ConnectionLifecycleManager::spawn(
            EndpointConfig::new("http://chat.test"),
            Arc::new(transport.clone()),
            catalog,
            source.provider(),
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        let a = transport.socket(0);
        a.connect();
        a.fire(TransportEvent::server(
            "chat_update",
            json!({"messageId": "m1", "textChunk": "Hi"}),
        ));
        tokio::time::sleep(Duration::from_millis(1)).await;

        // rotate, then a late chunk from the old socket must not render
        source.set_token(Some("B".into()));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!a.fire(TransportEvent::server(
            "chat_update",
            json!({"messageId": "m1", "textChunk": " from a ghost"}),
        )));

        let b = transport.socket(1);
        b.connect();
        b.fire(TransportEvent::server("chat_result", json!({"messageId": "m1"})));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.lock().last().cloned(), Some(("m1".into(), "Hi".into())));
        handle.unmount();
    }
}
