//! Periodic background work
//!
//! Each job runs on its own task, ticking at a fixed period until it is told
//! to stop. Stopping waits for an in-flight tick to finish.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work performed on every tick
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&self);
}

/// Handle to a running periodic job
pub struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Start ticking `job` every `period`; the first tick happens one period from now
    pub fn spawn(job: Arc<dyn PeriodicJob>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let name = job.name();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(task = name, period_secs = period.as_secs_f64(), "Background task started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        debug!(task = name, "Background task tick");
                        job.tick().await;
                    }
                }
            }

            info!(task = name, "Background task stopped");
        });

        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop and wait for it
    pub async fn shutdown(self) {
        // A closed channel means the task already exited
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let task = BackgroundTask::spawn(job.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 2);

        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let job = Arc::new(CountingJob {
            ticks: AtomicUsize::new(0),
        });
        let task = BackgroundTask::spawn(job.clone(), Duration::from_secs(1));
        assert_eq!(task.name(), "counting");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        task.shutdown().await;
        let after_shutdown = job.ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), after_shutdown);
    }
}
