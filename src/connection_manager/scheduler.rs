//! Cancellable repeating task

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What a tick asks the scheduler to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Fixed-period background task bound to a cancellation token
///
/// The first tick fires one period after spawn. Once the token is cancelled
/// no further tick starts.
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn_repeating<F, Fut>(period: Duration, token: CancellationToken, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if tick().await == TickOutcome::Stop {
                    break;
                }
            }

            tracing::debug!("Scheduled task stopped");
        });

        Self { token, handle }
    }

    /// Stop future ticks
    #[cfg(test)]
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the running tick, if any, to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Scheduled task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(period: Duration, stop_after: Option<usize>) -> (ScheduledTask, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = ScheduledTask::spawn_repeating(period, CancellationToken::new(), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                match stop_after {
                    Some(limit) if n >= limit => TickOutcome::Stop,
                    _ => TickOutcome::Continue,
                }
            }
        });
        (task, ticks)
    }

    #[tokio::test]
    async fn test_ticks_repeat_until_cancelled() {
        let (task, ticks) = counting_task(Duration::from_millis(20), None);

        tokio::time::sleep(Duration::from_millis(130)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);

        task.cancel();
        assert!(task.is_cancelled());
        // let a tick that might be mid-flight settle
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_first_tick_waits_one_period() {
        let (task, ticks) = counting_task(Duration::from_millis(200), None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        task.shutdown().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_outcome_ends_task() {
        let (task, ticks) = counting_task(Duration::from_millis(10), Some(3));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(task.is_finished());
    }
}
