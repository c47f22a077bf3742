//! Interval-driven background measurements
//!
//! The scheduler invokes the runner once per period with no server
//! constraint. A failed cycle is logged and the next tick proceeds normally.
//! Shutdown goes through a watch channel observed by the same `select!` as
//! the ticker, so stopping is deterministic.

use crate::error::RunError;
use crate::model::MeasurementRecord;
use crate::runner::MeasurementRunner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

pub struct Scheduler {
    runner: Arc<MeasurementRunner>,
    period: Duration,
}

/// Cycle counters since the scheduler started
#[derive(Debug, Default)]
pub struct SchedulerStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl SchedulerStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Stop the loop and wait for it to exit. Dropping the handle without
    /// calling this also stops the loop at its next wait point.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

impl Scheduler {
    pub fn new(runner: Arc<MeasurementRunner>, period: Duration) -> Self {
        Self { runner, period }
    }

    /// Period in whole minutes; zero is raised to one minute
    pub fn from_minutes(runner: Arc<MeasurementRunner>, minutes: u64) -> Self {
        Self::new(runner, Duration::from_secs(minutes.max(1) * 60))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the loop on the tokio runtime. An in-flight cycle gets `grace`
    /// to finish once shutdown is requested.
    pub fn spawn(self, grace: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(SchedulerStats::default());
        let task = tokio::spawn(self.run_loop(shutdown_rx, grace, stats.clone()));

        SchedulerHandle {
            shutdown_tx,
            task,
            stats,
        }
    }

    async fn run_loop(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        grace: Duration,
        stats: Arc<SchedulerStats>,
    ) {
        info!("Scheduler started, interval {:?}", self.period);

        // First cycle one full period after start
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            let cycle = self.runner.run(None);
            tokio::pin!(cycle);

            let result = tokio::select! {
                result = &mut cycle => result,
                _ = shutdown_rx.changed() => {
                    info!("Shutdown requested during a measurement, waiting up to {:?}", grace);
                    match tokio::time::timeout(grace, &mut cycle).await {
                        Ok(result) => record_outcome(&stats, result),
                        Err(_) => warn!("Abandoned in-flight measurement after {:?}", grace),
                    }
                    break;
                }
            };

            record_outcome(&stats, result);
        }

        info!(
            "Scheduler stopped ({} completed, {} failed)",
            stats.completed(),
            stats.failed()
        );
    }
}

fn record_outcome(stats: &SchedulerStats, result: Result<MeasurementRecord, RunError>) {
    match result {
        Ok(record) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
            info!(
                "Scheduled measurement {} stored: download {:.2} Mbps, upload {:.2} Mbps",
                record.id, record.measurement.download_mbps, record.measurement.upload_mbps
            );
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("Scheduled measurement failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::FakeProvider;
    use crate::runner::PhaseTimeouts;
    use crate::store::tests::temp_store;

    fn scheduler_with(provider: FakeProvider, period: Duration) -> (tempfile::TempDir, Arc<MeasurementRunner>, Scheduler) {
        let (dir, store) = temp_store();
        let runner = Arc::new(MeasurementRunner::new(
            Arc::new(provider),
            store,
            PhaseTimeouts::default(),
        ));
        let scheduler = Scheduler::new(runner.clone(), period);
        (dir, runner, scheduler)
    }

    #[test]
    fn test_minute_granularity() {
        let (_dir, store) = temp_store();
        let runner = Arc::new(MeasurementRunner::new(
            Arc::new(FakeProvider::default()),
            store,
            PhaseTimeouts::default(),
        ));

        assert_eq!(
            Scheduler::from_minutes(runner.clone(), 0).period(),
            Duration::from_secs(60)
        );
        assert_eq!(
            Scheduler::from_minutes(runner, 120).period(),
            Duration::from_secs(7200)
        );
    }

    #[tokio::test]
    async fn test_runs_cycles_until_shutdown() {
        let (_dir, runner, scheduler) =
            scheduler_with(FakeProvider::default(), Duration::from_millis(30));

        let handle = scheduler.spawn(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let stored = runner.store().count().unwrap();
        assert!(stored >= 2, "expected several cycles, got {}", stored);

        // Nothing runs after shutdown returned
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runner.store().count().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_failed_cycles_do_not_stop_schedule() {
        let (_dir, runner, scheduler) = scheduler_with(
            FakeProvider {
                fail_download: true,
                ..FakeProvider::default()
            },
            Duration::from_millis(30),
        );

        let handle = scheduler.spawn(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(handle.stats().failed() >= 2);
        assert_eq!(handle.stats().completed(), 0);
        handle.shutdown().await;

        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_cycle_before_first_period() {
        let (_dir, runner, scheduler) =
            scheduler_with(FakeProvider::default(), Duration::from_secs(3600));

        let handle = scheduler.spawn(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_cycle_after_grace() {
        let (_dir, runner, scheduler) = scheduler_with(
            FakeProvider {
                hang_download: true,
                ..FakeProvider::default()
            },
            Duration::from_millis(20),
        );
        let grace = Duration::from_millis(100);

        let handle = scheduler.spawn(grace);
        // First tick at 20ms, the cycle then hangs in download
        tokio::time::sleep(Duration::from_millis(60)).await;

        let started = std::time::Instant::now();
        handle.shutdown().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(90), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "waited too long: {:?}", elapsed);
        assert_eq!(runner.store().count().unwrap(), 0);
    }
}
