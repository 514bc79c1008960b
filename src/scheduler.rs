//! Minimal recurring-task facility: each poller registers as one named tokio
//! task looping on a fixed interval.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Spawn a named recurring task. Ticks never overlap within one task (a slow
/// cycle delays the next tick instead of stacking cycles), which is what
/// keeps last-seen updates serialized without extra locking. Errors are
/// logged and the next tick fires regardless.
pub fn spawn_recurring<F, Fut>(name: &'static str, period: Duration, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        info!(task = name, period_secs = period.as_secs(), "scheduled recurring task");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = task().await {
                error!(?err, task = name, "scheduled task failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn recurring_task_fires_on_each_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handle = spawn_recurring("test", Duration::from_secs(60), move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        // First tick is immediate, then one per period.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn task_errors_do_not_stop_the_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handle = spawn_recurring("failing", Duration::from_secs(60), move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            }
        });

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);
        handle.abort();
    }
}
