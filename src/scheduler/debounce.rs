//! Cancellable delayed task
//!
//! Each `schedule` call replaces the pending task: the previous timer is
//! aborted and a fresh one starts, so a burst of calls runs the action once,
//! `delay` after the last call.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Debounced task runner backed by the ambient tokio runtime
#[derive(Debug)]
pub struct Debouncer {
    name: &'static str,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer with a fixed quiet period
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run after the quiet period, cancelling any
    /// previously scheduled action.
    ///
    /// Returns `false` without running anything when no tokio runtime is
    /// available; the caller decides whether to run the action inline.
    pub fn schedule<F>(&self, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            return false;
        };

        let delay = self.delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            if !previous.is_finished() {
                debug!("{}: restarting debounce timer", self.name);
            }
            previous.abort();
        }

        true
    }

    /// Cancel the pending action, returns true if one was still waiting
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(task) => {
                let was_pending = !task.is_finished();
                task.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether an action is scheduled and has not yet run
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_schedule_without_runtime() {
        let debouncer = Debouncer::new("test", Duration::from_millis(10));
        assert!(!debouncer.schedule(|| {}));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn test_burst_runs_once() {
        let debouncer = Debouncer::new("test", Duration::from_millis(40));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let runs = runs.clone();
            assert!(debouncer.schedule(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(debouncer.is_pending());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn test_cancel_prevents_run() {
        let debouncer = Debouncer::new("test", Duration::from_millis(30));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.cancel());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }
}
