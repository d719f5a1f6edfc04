//! Trailing-edge debounce.
//!
//! Each `schedule` supersedes the previously pending trigger and restarts the
//! window; only the last one fires. Once fired, the action runs on its own
//! task, so superseding or cancelling never aborts an action in flight.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `action` once `window` has passed without another `schedule`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(action());
        });

        if let Some(previous) = self.pending.lock().replace(trigger) {
            previous.abort();
        }
    }

    /// Drop the pending trigger, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(trigger) => {
                let was_pending = !trigger.is_finished();
                trigger.abort();
                was_pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(trigger) = self.pending.get_mut().take() {
            trigger.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_action(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            debouncer.schedule(counter_action(&counter));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counter_action(&counter));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.schedule(counter_action(&counter));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_trigger() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counter_action(&counter));
        assert!(debouncer.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_action_survives_new_schedule() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let counter = Arc::new(AtomicUsize::new(0));

        let slow = counter.clone();
        debouncer.schedule(move || async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            slow.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The first action is in flight; this only supersedes the trigger.
        debouncer.schedule(counter_action(&counter));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
