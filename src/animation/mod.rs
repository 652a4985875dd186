//! Streaming text animation.
//!
//! Provides:
//! - [`StreamingTextAnimator`] - synchronous paced-reveal state machine
//! - [`AnimatorHandle`] - the same animator driven by a tokio task
//! - [`ContentSink`] / [`ContentBus`] - where revealed text goes

mod animator;
mod driver;
mod rate;
mod session;
mod sink;

pub use animator::{StreamingTextAnimator, TickOutcome};
pub use driver::{AnimatorHandle, StreamingState};
pub use rate::AnimationConfig;
pub use session::StreamSession;
pub use sink::{BusError, ContentBus, ContentReceiver, ContentSender, ContentSink, ContentUpdate};
