//! Job scheduler
//!
//! Owns one timer per sync job and one run guard per job. The guard is shared by
//! the timer and by manual triggers, so at most one pass per job is ever in flight;
//! the two jobs do not exclude each other.
//!
//! Timers fire once immediately on [`Scheduler::start`] and then on a fixed
//! interval. A tick that finds the job busy is skipped, and consecutive transport
//! failures make the timer skip ticks (see [`backoff`]).

pub mod backoff;
mod jobs;
pub mod metrics;

pub use jobs::{JobKind, PassReport, PlotSyncJob, SyncJob, ZoneSyncJob};

use crate::config::ScheduleConfig;
use crate::error::SyncError;
use crate::store::Store;
use crate::upstream::SnapshotSource;
use crate::Result;
use backoff::{BackoffPolicy, RetryableError, TickBackoff};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Observable state of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No timer armed and no pass in flight
    Idle,
    /// A pass is in flight
    Running,
    /// Timer armed, waiting for the next tick
    ArmedForNextTick,
}

/// State of both jobs, as reported by `/api/update-status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStates {
    #[serde(rename = "plot-sync")]
    pub plots: JobState,
    #[serde(rename = "zone-sync")]
    pub zones: JobState,
}

/// Everything the scheduler keeps for one job
struct JobSlot {
    job: Arc<dyn SyncJob>,
    interval: Duration,
    run_guard: tokio::sync::Mutex<()>,
    running: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    backoff: Mutex<TickBackoff>,
}

/// Clears the running flag however the pass ends
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobSlot {
    fn new(job: Arc<dyn SyncJob>, interval: Duration, policy: BackoffPolicy) -> Self {
        Self {
            job,
            // tokio intervals panic on a zero period
            interval: interval.max(Duration::from_millis(1)),
            run_guard: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            timer: Mutex::new(None),
            backoff: Mutex::new(TickBackoff::new(policy)),
        }
    }

    fn kind(&self) -> JobKind {
        self.job.kind()
    }

    fn is_armed(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn state(&self) -> JobState {
        if self.running.load(Ordering::SeqCst) {
            JobState::Running
        } else if self.is_armed() {
            JobState::ArmedForNextTick
        } else {
            JobState::Idle
        }
    }

    /// Run one pass if none is in flight
    async fn execute(&self) -> Result<PassReport> {
        let kind = self.kind();
        let _guard = self.run_guard.try_lock().map_err(|_| SyncError::Busy(kind))?;
        let _running = RunningFlag::raise(&self.running);

        tracing::debug!(job = %kind, "Starting sync pass");
        let started = Instant::now();
        let result = self.job.run_pass().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(report) => {
                lock(&self.backoff).record_success();
                metrics::record_pass(kind.as_str(), "success", elapsed.as_secs_f64());
                tracing::info!(
                    job = %kind,
                    changes = report.change_count(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Sync pass complete"
                );
            }
            Err(e) => {
                let skipped = lock(&self.backoff).record_failure(e.retry_decision());
                metrics::record_pass(kind.as_str(), e.kind(), elapsed.as_secs_f64());
                tracing::warn!(
                    job = %kind,
                    error = %e,
                    skipped_ticks = skipped,
                    duration_ms = elapsed.as_millis() as u64,
                    "Sync pass failed"
                );
            }
        }

        result
    }
}

/// Run a pass on its own task so that aborting the caller never cuts a pass short
async fn spawn_pass(slot: Arc<JobSlot>) -> Result<PassReport> {
    tokio::spawn(async move { slot.execute().await }).await?
}

async fn tick_loop(slot: Arc<JobSlot>) {
    let kind = slot.kind();
    let mut interval = tokio::time::interval(slot.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        if lock(&slot.backoff).should_skip() {
            tracing::debug!(job = %kind, "Skipping tick while backing off");
            metrics::record_skipped_tick(kind.as_str(), "backoff");
            continue;
        }

        if let Err(SyncError::Busy(_)) = spawn_pass(slot.clone()).await {
            tracing::info!(job = %kind, "Previous pass still running, skipping tick");
            metrics::record_skipped_tick(kind.as_str(), "busy");
        }
    }
}

/// Periodic and manual execution of the sync jobs
#[derive(Clone)]
pub struct Scheduler {
    plots: Arc<JobSlot>,
    zones: Arc<JobSlot>,
}

impl Scheduler {
    /// Create a scheduler for the given jobs; no timer runs until [`start`](Self::start)
    pub fn new(
        plot_job: Arc<dyn SyncJob>,
        zone_job: Arc<dyn SyncJob>,
        config: &ScheduleConfig,
    ) -> Self {
        let policy = BackoffPolicy::new(config.max_skipped_ticks);
        Self {
            plots: Arc::new(JobSlot::new(plot_job, config.plots_interval(), policy)),
            zones: Arc::new(JobSlot::new(zone_job, config.zones_interval(), policy)),
        }
    }

    /// Create a scheduler running the standard plot and zone jobs
    pub fn from_source(source: Arc<dyn SnapshotSource>, store: Store, config: &ScheduleConfig) -> Self {
        Self::new(
            Arc::new(PlotSyncJob::new(source.clone(), store.clone())),
            Arc::new(ZoneSyncJob::new(source, store)),
            config,
        )
    }

    fn slot(&self, kind: JobKind) -> &Arc<JobSlot> {
        match kind {
            JobKind::Plots => &self.plots,
            JobKind::Zones => &self.zones,
        }
    }

    /// Arm one timer per job
    ///
    /// Calling this again while the timers are armed does nothing. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let mut armed = 0;
        for kind in JobKind::ALL {
            let slot = self.slot(kind);
            let mut timer = lock(&slot.timer);
            if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
                continue;
            }
            tracing::info!(job = %kind, interval_secs = slot.interval.as_secs(), "Arming sync timer");
            *timer = Some(tokio::spawn(tick_loop(slot.clone())));
            armed += 1;
        }

        if armed > 0 {
            metrics::set_scheduler_active(true);
        } else {
            tracing::debug!("Scheduler already started");
        }
    }

    /// Stop the timers; passes already in flight run to completion
    pub fn shutdown(&self) {
        for kind in JobKind::ALL {
            if let Some(handle) = lock(&self.slot(kind).timer).take() {
                handle.abort();
                tracing::info!(job = %kind, "Sync timer stopped");
            }
        }
        metrics::set_scheduler_active(false);
    }

    /// Whether any timer is armed
    pub fn is_active(&self) -> bool {
        JobKind::ALL.iter().any(|kind| self.slot(*kind).is_armed())
    }

    /// Run a pass now, outside the timer
    ///
    /// Fails with [`SyncError::Busy`] if a pass of the same job is in flight.
    /// Transport backoff does not apply to manual passes.
    pub async fn trigger(&self, kind: JobKind) -> Result<PassReport> {
        tracing::info!(job = %kind, "Manual sync requested");
        spawn_pass(self.slot(kind).clone()).await
    }

    pub fn state(&self, kind: JobKind) -> JobState {
        self.slot(kind).state()
    }

    pub fn states(&self) -> JobStates {
        JobStates {
            plots: self.state(JobKind::Plots),
            zones: self.state(JobKind::Zones),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlotSnapshot, ZoneSnapshot};
    use crate::reconcile::PlotReconcileReport;
    use crate::store::StoreConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const PLOTS: &str = r#"{
        "sensores": {"humedad": 40, "temperatura": 25, "lluvia": 0, "sol": 1},
        "parcelas": [{"id": 1, "nombre": "Norte", "ultimo_riego": "2025-03-01 08:00:00",
                      "latitud": 21.0, "longitud": -86.0,
                      "sensor": {"humedad": 50, "temperatura": 24, "lluvia": 0, "sol": 70}}]
    }"#;

    /// Snapshot source with a configurable delay that counts its calls
    struct FixtureSource {
        delay: Duration,
        fail: AtomicBool,
        plot_fetches: AtomicUsize,
        zone_fetches: AtomicUsize,
    }

    impl FixtureSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail: AtomicBool::new(false),
                plot_fetches: AtomicUsize::new(0),
                zone_fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SnapshotSource for FixtureSource {
        async fn fetch_plots(&self) -> Result<PlotSnapshot> {
            self.plot_fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("connection refused".to_string()));
            }
            PlotSnapshot::from_json(PLOTS)
        }

        async fn fetch_zones(&self) -> Result<ZoneSnapshot> {
            self.zone_fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            ZoneSnapshot::from_json(r#"{"zonas": [{"id": 1, "estado": "activo"}]}"#)
        }
    }

    fn config(interval_secs: u64) -> ScheduleConfig {
        ScheduleConfig {
            plots_interval_secs: interval_secs,
            zones_interval_secs: interval_secs,
            ..Default::default()
        }
    }

    fn scheduler(source: Arc<FixtureSource>, interval_secs: u64) -> (Scheduler, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp_dir.path().join("fieldsync.db"))).unwrap();
        let scheduler = Scheduler::from_source(source, store, &config(interval_secs));
        (scheduler, temp_dir)
    }

    #[tokio::test]
    async fn test_concurrent_triggers_run_one_pass() {
        let source = FixtureSource::new(Duration::from_millis(200));
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        let (first, second) = tokio::join!(
            scheduler.trigger(JobKind::Plots),
            scheduler.trigger(JobKind::Plots)
        );

        let outcomes = [first, second];
        let passes = outcomes.iter().filter(|r| r.is_ok()).count();
        let busy = outcomes
            .iter()
            .filter(|r| matches!(r, Err(SyncError::Busy(JobKind::Plots))))
            .count();
        assert_eq!(passes, 1);
        assert_eq!(busy, 1);
        assert_eq!(source.plot_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_jobs_do_not_exclude_each_other() {
        let source = FixtureSource::new(Duration::from_millis(100));
        let (scheduler, _temp) = scheduler(source, 3600);

        let (plots, zones) = tokio::join!(
            scheduler.trigger(JobKind::Plots),
            scheduler.trigger(JobKind::Zones)
        );

        assert!(matches!(plots, Ok(PassReport::Plots(_))));
        assert!(matches!(zones, Ok(PassReport::Zones(_))));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let source = FixtureSource::new(Duration::from_millis(10));
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.start() })
            })
            .collect();
        for joined in futures::future::join_all(handles).await {
            joined.unwrap();
        }
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(200)).await;

        // One immediate tick per job, and nothing else for an hour
        assert_eq!(source.plot_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(source.zone_fetches.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_active());
        assert_eq!(scheduler.state(JobKind::Plots), JobState::ArmedForNextTick);

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_tick_skipped_while_manual_pass_runs() {
        let source = FixtureSource::new(Duration::from_millis(300));
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        let manual = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(JobKind::Plots).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.state(JobKind::Plots), JobState::Running);

        // The immediate tick lands while the manual pass holds the guard
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manual.await.unwrap().is_ok());
        assert_eq!(source.plot_fetches.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_and_restart() {
        let source = FixtureSource::new(Duration::from_millis(10));
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        assert_eq!(scheduler.state(JobKind::Zones), JobState::Idle);
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!scheduler.is_active());
        assert_eq!(scheduler.state(JobKind::Zones), JobState::Idle);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.is_active());
        assert_eq!(source.zone_fetches.load(Ordering::SeqCst), 2);

        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_transport_failures_back_off_and_success_resets() {
        let source = FixtureSource::new(Duration::from_millis(1));
        source.fail.store(true, Ordering::SeqCst);
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        // Manual triggers ignore the backoff: every one of them fetches
        for _ in 0..3 {
            let result = scheduler.trigger(JobKind::Plots).await;
            assert!(matches!(result, Err(SyncError::Transport(_))));
        }
        assert_eq!(source.plot_fetches.load(Ordering::SeqCst), 3);
        assert_eq!(lock(&scheduler.plots.backoff).consecutive_failures(), 3);

        source.fail.store(false, Ordering::SeqCst);
        let report = scheduler.trigger(JobKind::Plots).await.unwrap();
        match report {
            PassReport::Plots(PlotReconcileReport { inserted, .. }) => assert_eq!(inserted, vec![1]),
            other => panic!("expected plot report, got {:?}", other),
        }
        assert_eq!(lock(&scheduler.plots.backoff).consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_ticks_skip_during_backoff() {
        let source = FixtureSource::new(Duration::from_millis(1));
        source.fail.store(true, Ordering::SeqCst);
        let (scheduler, _temp) = scheduler(source.clone(), 3600);

        // Two failures: the next tick is skipped
        scheduler.trigger(JobKind::Plots).await.unwrap_err();
        scheduler.trigger(JobKind::Plots).await.unwrap_err();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(source.plot_fetches.load(Ordering::SeqCst), 2);
        assert!(!lock(&scheduler.plots.backoff).should_skip());

        scheduler.shutdown();
    }
}
