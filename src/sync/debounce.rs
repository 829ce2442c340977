//! Trailing-edge debounce for outbound publishes.
//!
//! Every [`Debouncer::schedule`] call restarts the quiet window. The sink runs
//! once the window elapses with no further calls, carrying the most recent
//! value. A caller who never pauses for longer than the window never
//! publishes; this is not a periodic flush.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Quiet window used by the directory editor.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Coalesces bursts of values into a single call of an async sink.
///
/// Must be created inside a tokio runtime. Dropping the debouncer cancels any
/// pending value.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
    window: Duration,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(window: Duration, sink: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run(window, rx, Arc::clone(&cancelled), sink));

        Self {
            tx,
            cancelled,
            task,
            window,
        }
    }

    /// Replaces any pending value with `value` and restarts the window.
    ///
    /// Never blocks. Returns `false` once the debouncer has been cancelled.
    pub fn schedule(&self, value: T) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx.send(value).is_ok()
    }

    /// Drops any pending value; the sink will not run again.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("debouncer cancelled");
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

async fn run<T, F, Fut>(
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<T>,
    cancelled: Arc<AtomicBool>,
    mut sink: F,
) where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: Option<T> = None;

    loop {
        if pending.is_none() {
            match rx.recv().await {
                Some(value) => pending = Some(value),
                None => return,
            }
            continue;
        }

        tokio::select! {
            next = rx.recv() => match next {
                Some(value) => pending = Some(value),
                // Sender dropped: the owner is gone, discard the pending value.
                None => return,
            },
            _ = tokio::time::sleep(window) => {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(value) = pending.take() {
                    sink(value).await;
                }
            }
        }
    }
}
