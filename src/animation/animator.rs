//! Paced reveal of streamed text.
//!
//! [`StreamingTextAnimator`] is a synchronous state machine. It never sleeps
//! on its own; it records the deadline of its next tick and whoever owns it
//! (normally the driver in `driver.rs`) calls [`StreamingTextAnimator::tick`]
//! when that deadline passes.

use tokio::time::Instant;
use tracing::{debug, trace};

use super::rate::AnimationConfig;
use super::session::StreamSession;
use super::sink::ContentSink;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session or no scheduled tick; nothing happened.
    Inactive,
    /// Revealed this many characters and scheduled the next tick.
    Revealed(usize),
    /// Caught up but more data may arrive; backed off.
    Waiting,
    /// Caught up after completion; the session was retired.
    Finished,
}

/// Reveals the text of one message at a smoothed rate.
pub struct StreamingTextAnimator<S> {
    config: AnimationConfig,
    sink: S,
    session: Option<StreamSession>,
    streaming: bool,
}

impl<S: ContentSink> StreamingTextAnimator<S> {
    pub fn new(config: AnimationConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            session: None,
            streaming: false,
        }
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    /// Whether a session is actively receiving or revealing text.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Id of the message currently being streamed, if any.
    pub fn current_streaming_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.message_id())
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Deadline of the next scheduled tick.
    pub fn next_tick(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.next_tick)
    }

    /// Begin a new session, flushing and replacing any previous one.
    pub fn start_streaming(&mut self, message_id: impl Into<String>) {
        self.stop_streaming();
        let session = StreamSession::new(message_id);
        debug!(message_id = %session.message_id(), "Starting stream");
        self.session = Some(session);
    }

    /// Append a fragment to the active session.
    pub fn process_chunk(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            trace!("Chunk without an active stream, dropping");
            return;
        };

        session.append(fragment);
        if session.next_tick.is_none() {
            session.next_tick = Some(Instant::now() + self.config.interval());
        }
        self.streaming = true;
    }

    /// Signal that no more chunks will arrive for this session.
    ///
    /// The buffered backlog keeps revealing at its own pace.
    pub fn complete_stream(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.mark_complete();

        if !session.has_pending_tick() && session.is_caught_up() {
            self.retire();
        }
    }

    /// Cancel the session, emitting the full buffered text if it was not yet
    /// shown.
    pub fn stop_streaming(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.next_tick = None;
            if !session.is_caught_up() {
                session.reveal_all();
                self.sink.update(session.message_id(), session.full_text());
            }
            debug!(message_id = %session.message_id(), "Stopped stream");
        }
        self.streaming = false;
    }

    /// Run one animation step.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Inactive;
        };
        if session.next_tick.is_none() {
            return TickOutcome::Inactive;
        }

        let revealed = session.advance(self.config.chars_for_tick(session.remaining()));
        if revealed == 0 {
            if session.is_server_complete() {
                self.retire();
                return TickOutcome::Finished;
            }
            session.next_tick = Some(Instant::now() + self.config.idle_interval());
            return TickOutcome::Waiting;
        }

        self.sink
            .update(session.message_id(), session.displayed_text());
        session.next_tick = Some(Instant::now() + self.config.interval());
        TickOutcome::Revealed(revealed)
    }

    fn retire(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(
                message_id = %session.message_id(),
                chars = session.total_len(),
                "Stream finished"
            );
        }
        self.streaming = false;
    }
}
