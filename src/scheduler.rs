use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cloneable "run now" request for a periodic task.
#[derive(Clone, Default)]
pub struct RefreshTrigger(Arc<Notify>);

impl RefreshTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests made while a run is in progress collapse into one extra run.
    pub fn trigger_now(&self) {
        self.0.notify_one();
    }

    async fn wait(&self) {
        self.0.notified().await;
    }
}

pub struct PeriodicHandle {
    trigger: RefreshTrigger,
    task: JoinHandle<()>,
}

impl PeriodicHandle {
    pub fn trigger_now(&self) {
        self.trigger.trigger_now();
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `job` immediately, then every `interval` and whenever triggered.
/// A manual trigger restarts the interval.
pub fn schedule_periodic<F, Fut>(interval: Duration, job: F) -> PeriodicHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let trigger = RefreshTrigger::new();
    let waiter = trigger.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = waiter.wait() => ticker.reset(),
            }
            job().await;
        }
    });
    PeriodicHandle { trigger, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_immediately_and_on_trigger() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = schedule_periodic(Duration::from_secs(3600), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.trigger_now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.trigger_now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_handle_stops_task() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = schedule_periodic(Duration::from_secs(3600), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let trigger = handle.trigger();
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger_now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
