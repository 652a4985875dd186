//! Async driver for the text animator.
//!
//! A single task owns the [`StreamingTextAnimator`] and processes EITHER a
//! command OR a tick per loop iteration, so every mutation happens on one
//! logical execution context and commands keep their call order.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::animator::StreamingTextAnimator;
use super::rate::AnimationConfig;
use super::sink::ContentSink;

/// Far enough in the future to stand in for "no tick scheduled".
const IDLE_PARK: Duration = Duration::from_secs(24 * 3600);

/// Observable animator state, as of the last processed command or tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingState {
    pub is_streaming: bool,
    pub current_streaming_id: Option<String>,
}

enum Command {
    Start(String),
    Chunk(String),
    Complete,
    Stop,
}

/// Cloneable handle to a running animator task.
#[derive(Clone)]
pub struct AnimatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<StreamingState>,
}

impl AnimatorHandle {
    /// Spawn the animator task on the current tokio runtime.
    ///
    /// The task exits, after a final flush, once every handle is dropped.
    pub fn spawn<S: ContentSink>(config: AnimationConfig, sink: S) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(StreamingState::default());
        let animator = StreamingTextAnimator::new(config, sink);
        let task = tokio::spawn(run(animator, rx, state_tx));
        (
            Self {
                tx,
                state: state_rx,
            },
            task,
        )
    }

    pub fn start_streaming(&self, message_id: impl Into<String>) {
        self.send(Command::Start(message_id.into()));
    }

    pub fn process_chunk(&self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if fragment.is_empty() {
            return;
        }
        self.send(Command::Chunk(fragment));
    }

    pub fn complete_stream(&self) {
        self.send(Command::Complete);
    }

    pub fn stop_streaming(&self) {
        self.send(Command::Stop);
    }

    pub fn is_streaming(&self) -> bool {
        self.state.borrow().is_streaming
    }

    pub fn current_streaming_id(&self) -> Option<String> {
        self.state.borrow().current_streaming_id.clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<StreamingState> {
        self.state.clone()
    }

    fn send(&self, command: Command) {
        // the task only stops once every handle is gone, so this cannot fail
        // while `self` is alive
        let _ = self.tx.send(command);
    }
}

async fn run<S: ContentSink>(
    mut animator: StreamingTextAnimator<S>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<StreamingState>,
) {
    loop {
        let deadline = animator.next_tick();
        let parked = Instant::now() + IDLE_PARK;

        tokio::select! {
            biased;

            command = rx.recv() => match command {
                Some(Command::Start(id)) => animator.start_streaming(id),
                Some(Command::Chunk(text)) => animator.process_chunk(&text),
                Some(Command::Complete) => animator.complete_stream(),
                Some(Command::Stop) => animator.stop_streaming(),
                None => {
                    animator.stop_streaming();
                    publish(&animator, &state_tx);
                    break;
                }
            },

            _ = sleep_until(deadline.unwrap_or(parked)), if deadline.is_some() => {
                animator.tick();
            }
        }

        publish(&animator, &state_tx);
    }

    debug!("Animator task exiting");
}

fn publish<S: ContentSink>(
    animator: &StreamingTextAnimator<S>,
    state_tx: &watch::Sender<StreamingState>,
) {
    let next = StreamingState {
        is_streaming: animator.is_streaming(),
        current_streaming_id: animator.current_streaming_id().map(str::to_string),
    };
    state_tx.send_if_modified(|state| {
        if *state == next {
            false
        } else {
            *state = next;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn spawn_recording() -> (Calls, AnimatorHandle, JoinHandle<()>) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let captured = calls.clone();
        let (handle, task) = AnimatorHandle::spawn(
            AnimationConfig::default(),
            move |id: &str, text: &str| {
                captured.lock().push((id.to_string(), text.to_string()));
            },
        );
        (calls, handle, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hi_example_end_to_end() {
        let (calls, handle, _task) = spawn_recording();
        handle.start_streaming("m1");
        handle.process_chunk("Hi");

        tokio::time::sleep(Duration::from_millis(15)).await;
        {
            let calls = calls.lock();
            let (id, text) = calls.first().expect("one tick should have run");
            assert_eq!(id, "m1");
            assert!("Hi".starts_with(text.as_str()) && !text.is_empty());
        }

        handle.complete_stream();
        let mut state = handle.subscribe();
        state
            .wait_for(|s| !s.is_streaming && s.current_streaming_id.is_none())
            .await
            .unwrap();

        assert_eq!(
            calls.lock().last().cloned(),
            Some(("m1".to_string(), "Hi".to_string()))
        );
        assert!(!handle.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_reveal_flushes() {
        let (calls, handle, _task) = spawn_recording();
        let text = "a long answer that needs many ticks to reveal ".repeat(20);
        handle.start_streaming("m1");
        handle.process_chunk(text.clone());

        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.stop_streaming();

        let mut state = handle.subscribe();
        state.wait_for(|s| s.current_streaming_id.is_none()).await.unwrap();

        let calls = calls.lock();
        assert!(calls.len() >= 2, "expected partial reveals before the flush");
        assert!(calls[0].1.len() < text.len());
        assert_eq!(calls.last().unwrap().1, text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_completion() {
        let (calls, handle, _task) = spawn_recording();
        handle.start_streaming("m1");
        handle.process_chunk("short");
        handle.complete_stream();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut state = handle.subscribe();
        state.wait_for(|s| s.current_streaming_id.is_none()).await.unwrap();
        let count = calls.lock().len();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.lock().len(), count);
        assert_eq!(calls.lock().last().unwrap().1, "short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_misuse_emits_nothing() {
        let (calls, handle, _task) = spawn_recording();
        handle.process_chunk("orphan");
        handle.complete_stream();
        handle.stop_streaming();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(calls.lock().is_empty());
        assert!(!handle.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_flushes_and_exits() {
        let (calls, handle, task) = spawn_recording();
        handle.start_streaming("m1");
        handle.process_chunk("unfinished business");
        drop(handle);

        task.await.unwrap();
        assert_eq!(calls.lock().last().unwrap().1, "unfinished business");
    }
}
