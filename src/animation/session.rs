//! Per-message stream state.

use tokio::time::Instant;

/// Buffered text for one in-progress message.
///
/// Lengths are counted in `char`s so a reveal never splits a code point.
#[derive(Debug, Clone)]
pub struct StreamSession {
    message_id: String,
    full_text: String,
    total_chars: usize,
    displayed_chars: usize,
    displayed_bytes: usize,
    server_complete: bool,
    pub(super) next_tick: Option<Instant>,
}

impl StreamSession {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            full_text: String::new(),
            total_chars: 0,
            displayed_chars: 0,
            displayed_bytes: 0,
            server_complete: false,
            next_tick: None,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// The prefix of the buffer already shown to the consumer.
    pub fn displayed_text(&self) -> &str {
        &self.full_text[..self.displayed_bytes]
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed_chars
    }

    pub fn total_len(&self) -> usize {
        self.total_chars
    }

    pub fn remaining(&self) -> usize {
        self.total_chars - self.displayed_chars
    }

    pub fn is_caught_up(&self) -> bool {
        self.displayed_chars == self.total_chars
    }

    pub fn is_server_complete(&self) -> bool {
        self.server_complete
    }

    pub fn has_pending_tick(&self) -> bool {
        self.next_tick.is_some()
    }

    pub(super) fn append(&mut self, fragment: &str) {
        self.full_text.push_str(fragment);
        self.total_chars += fragment.chars().count();
    }

    pub(super) fn mark_complete(&mut self) {
        self.server_complete = true;
    }

    /// Reveal up to `n` more characters, returning how many were revealed.
    pub(super) fn advance(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        if n == 0 {
            return 0;
        }
        let hidden = &self.full_text[self.displayed_bytes..];
        let offset = hidden
            .char_indices()
            .nth(n)
            .map(|(idx, _)| idx)
            .unwrap_or(hidden.len());
        self.displayed_bytes += offset;
        self.displayed_chars += n;
        n
    }

    /// Mark everything as displayed.
    pub(super) fn reveal_all(&mut self) {
        self.displayed_bytes = self.full_text.len();
        self.displayed_chars = self.total_chars;
    }
}
