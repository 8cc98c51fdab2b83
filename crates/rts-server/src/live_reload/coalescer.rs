//! Change coalescing for live reload.
//!
//! Collapses a burst of editor changes into a single emission carrying the
//! most recent content, once the editor has been quiet for the window.
//!
//! The coalescer is a task owning a two-state machine:
//!
//! ```text
//!            change                    change (re-arm timer)
//!   IDLE ─────────────► PENDING ◄──────────────┐
//!     ▲                   │  └─────────────────┘
//!     └───── timer ───────┘  emit latest
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

/// Default quiet period before the latest change is emitted.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// Downstream consumer of coalesced content.
pub trait ChangeSink: Send + Sync + 'static {
    /// Receive the latest content of a quiet period.
    fn emit(&self, content: String);
}

/// Coalescer state.
enum State {
    Idle,
    Pending {
        latest: String,
        timer: Pin<Box<Sleep>>,
    },
}

/// Handle to a running coalescer task.
pub struct ChangeCoalescer {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl ChangeCoalescer {
    /// Spawn a coalescer emitting into `sink` after `window` of quiet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(window: Duration, sink: Arc<dyn ChangeSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, window, sink));
        Self { tx, task }
    }

    /// Record a change. The content replaces any pending content.
    pub fn submit(&self, content: String) {
        if self.tx.send(content).is_err() {
            tracing::debug!("Coalescer stopped, change dropped");
        }
    }

    /// Stop the coalescer. Pending content is discarded, not flushed.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Coalescer task failed");
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<String>, window: Duration, sink: Arc<dyn ChangeSink>) {
    let mut state = State::Idle;

    loop {
        state = match state {
            State::Idle => match rx.recv().await {
                Some(content) => State::Pending {
                    latest: content,
                    timer: Box::pin(tokio::time::sleep(window)),
                },
                None => return,
            },
            State::Pending { latest, mut timer } => {
                tokio::select! {
                    () = &mut timer => {
                        tracing::debug!(bytes = latest.len(), "Emitting coalesced change");
                        sink.emit(latest);
                        State::Idle
                    }
                    change = rx.recv() => match change {
                        Some(content) => {
                            timer.as_mut().reset(Instant::now() + window);
                            State::Pending { latest: content, timer }
                        }
                        None => {
                            tracing::debug!("Coalescer stopped with pending change");
                            return;
                        }
                    },
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingSink {
        emitted: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn emitted(&self) -> Vec<String> {
            self.emitted.lock().unwrap().clone()
        }
    }

    impl ChangeSink for RecordingSink {
        fn emit(&self, content: String) {
            self.emitted.lock().unwrap().push(content);
        }
    }

    fn coalescer(window: Duration) -> (ChangeCoalescer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = ChangeCoalescer::spawn(window, Arc::clone(&sink) as Arc<dyn ChangeSink>);
        (coalescer, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_change_emitted_after_window() {
        let (coalescer, sink) = coalescer(DEFAULT_WINDOW);

        coalescer.submit("a".to_owned());

        sleep(Duration::from_millis(400)).await;
        assert!(sink.emitted().is_empty());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.emitted(), vec!["a".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_only_latest() {
        let (coalescer, sink) = coalescer(DEFAULT_WINDOW);

        coalescer.submit("a".to_owned());
        sleep(Duration::from_millis(100)).await;
        coalescer.submit("ab".to_owned());
        sleep(Duration::from_millis(100)).await;
        coalescer.submit("abc".to_owned());

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.emitted(), vec!["abc".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_restarts_on_each_change() {
        let (coalescer, sink) = coalescer(DEFAULT_WINDOW);

        // Changes every 400ms keep the window from ever expiring
        for content in ["1", "2", "3", "4"] {
            coalescer.submit(content.to_owned());
            sleep(Duration::from_millis(400)).await;
            assert!(sink.emitted().is_empty());
        }

        sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.emitted(), vec!["4".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_quiet_periods_emit_separately() {
        let (coalescer, sink) = coalescer(DEFAULT_WINDOW);

        coalescer.submit("first".to_owned());
        sleep(Duration::from_millis(600)).await;
        coalescer.submit("second".to_owned());
        sleep(Duration::from_millis(600)).await;

        assert_eq!(sink.emitted(), vec!["first".to_owned(), "second".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_changes_in_window_emit_once() {
        let (coalescer, sink) = coalescer(Duration::from_millis(50));

        for i in 0..100 {
            coalescer.submit(format!("c{i}"));
        }
        sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.emitted(), vec!["c99".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let (coalescer, sink) = coalescer(DEFAULT_WINDOW);

        coalescer.submit("unsent".to_owned());
        sleep(Duration::from_millis(10)).await;
        coalescer.shutdown().await;

        sleep(Duration::from_millis(1000)).await;
        assert!(sink.emitted().is_empty());
    }
}
