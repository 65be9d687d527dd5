//! Periodic order sweeps.
//!
//! Each job gets its own ticker task. The loop awaits the job body before the
//! next tick is taken, so two cycles of the same job can never overlap; a slow
//! cycle delays the next one instead.

mod jobs;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use jobs::{
    CompletionRequestSweep, FeedbackRequestSweep, OverdueOrderSweep, PickupReminderSweep,
    StaleTrackingSweep, SweepJob,
};

use crate::infrastructure::config::SweepConfig;

pub struct SweepScheduler {
    jobs: Vec<(Arc<dyn SweepJob>, Duration)>,
    shutdown: broadcast::Sender<()>,
}

impl SweepScheduler {
    pub fn new(shutdown: broadcast::Sender<()>) -> Self {
        Self {
            jobs: Vec::new(),
            shutdown,
        }
    }

    pub fn add_job(mut self, job: Arc<dyn SweepJob>, interval: Duration) -> Self {
        self.jobs.push((job, interval));
        self
    }

    /// Standard job set wired from config
    pub fn with_standard_jobs(
        self,
        config: &SweepConfig,
        store: Arc<dyn crate::store::MarketStore>,
        bus: Arc<crate::events::EventBus>,
    ) -> Self {
        self.add_job(
            Arc::new(OverdueOrderSweep::new(
                store.clone(),
                bus.clone(),
                config.overdue_after_mins,
            )),
            Duration::from_secs(config.overdue_interval_secs),
        )
        .add_job(
            Arc::new(PickupReminderSweep::new(
                store.clone(),
                bus.clone(),
                config.pickup_after_mins,
            )),
            Duration::from_secs(config.pickup_interval_secs),
        )
        .add_job(
            Arc::new(StaleTrackingSweep::new(
                store.clone(),
                bus.clone(),
                config.tracking_stale_mins,
            )),
            Duration::from_secs(config.tracking_interval_secs),
        )
        .add_job(
            Arc::new(CompletionRequestSweep::new(
                store.clone(),
                bus.clone(),
                config.completion_after_mins,
            )),
            Duration::from_secs(config.completion_interval_secs),
        )
        .add_job(
            Arc::new(FeedbackRequestSweep::new(
                store,
                bus,
                config.feedback_after_mins,
            )),
            Duration::from_secs(config.feedback_interval_secs),
        )
    }

    /// Spawn one ticker task per job. Returns the handles so the caller can
    /// await them during shutdown.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|(job, interval)| {
                let mut shutdown = self.shutdown.subscribe();
                tokio::spawn(async move {
                    let mut timer = tokio::time::interval(interval);
                    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    // Skip immediate first tick
                    timer.tick().await;

                    tracing::info!(
                        job = job.name(),
                        interval_secs = interval.as_secs(),
                        "Sweep job started"
                    );

                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => {
                                tracing::info!(job = job.name(), "Sweep job received shutdown signal");
                                break;
                            }
                            _ = timer.tick() => {
                                match job.run().await {
                                    Ok(published) if published > 0 => {
                                        tracing::info!(
                                            job = job.name(),
                                            published = published,
                                            "Sweep cycle completed"
                                        );
                                    }
                                    Ok(_) => {
                                        tracing::debug!(job = job.name(), "Sweep cycle completed, nothing to do");
                                    }
                                    Err(e) => {
                                        // Store outage or similar; skip this
                                        // cycle and retry on the next tick
                                        tracing::warn!(
                                            job = job.name(),
                                            error = %e,
                                            "Sweep cycle failed"
                                        );
                                    }
                                }
                            }
                        }
                    }

                    tracing::info!(job = job.name(), "Sweep job stopped");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SweepJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<usize> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_and_stops_on_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (shutdown, _) = broadcast::channel(1);

        let handles = SweepScheduler::new(shutdown.clone())
            .add_job(
                Arc::new(CountingJob { runs: runs.clone() }),
                Duration::from_millis(10),
            )
            .start();

        // First tick at 0ms is skipped; cycles at 10..50ms
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 5);

        let _ = shutdown.send(());
        for handle in handles {
            handle.await.unwrap();
        }
    }

    struct SlowJob {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SweepJob for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run(&self) -> Result<usize> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_delays_next_instead_of_overlapping() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (shutdown, _) = broadcast::channel(1);

        let handles = SweepScheduler::new(shutdown.clone())
            .add_job(
                Arc::new(SlowJob { runs: runs.clone() }),
                Duration::from_millis(10),
            )
            .start();

        // On the paused clock the timeline is exact: the first tick is
        // consumed at 0ms, cycles start at 10/50/90ms because each 40ms body
        // delays the following tick. Overlapping cycles would start every
        // 10ms and reach 9 runs by now.
        tokio::time::sleep(Duration::from_millis(95)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        let _ = shutdown.send(());
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
