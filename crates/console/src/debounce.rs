#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Trailing-edge debouncer: a burst of `schedule` calls within the wait
/// window collapses into one execution, timed from the last call. The
/// work never runs synchronously inside `schedule`.
pub struct Debouncer {
    wait: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(wait: Duration) -> Self {
        Self { wait, pending: Mutex::new(None) }
    }

    pub fn schedule<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wait = self.wait;
        let task = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            f().await;
        });
        let mut pending = match self.pending.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if let Some(prev) = pending.replace(task) {
            prev.abort();
        }
    }

    /// Drop any pending invocation without running it.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(prev) = pending.take() {
                prev.abort();
            }
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_trailing_run() {
        let d = Debouncer::new(Duration::from_millis(2000));
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let runs = runs.clone();
            d.schedule(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        // nothing yet: the window is still open
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // quiet period: no further runs
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_times_from_last_call() {
        let d = Debouncer::new(Duration::from_millis(2000));
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        d.schedule(move || async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let r = runs.clone();
        d.schedule(move || async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        // 3000ms since the first call, but only 1500 since the second
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_never_runs_synchronously() {
        let d = Debouncer::new(Duration::from_millis(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        d.schedule(move || async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        // even a zero wait defers to the executor
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_run() {
        let d = Debouncer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        d.schedule(move || async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        d.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
