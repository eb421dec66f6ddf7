//! Sync jobs
//!
//! A job is one fetch followed by one reconciliation pass. Jobs know nothing about
//! timers or exclusion; the [`Scheduler`](super::Scheduler) owns both.

use super::metrics;
use crate::model::PlotSnapshot;
use crate::reconcile::{reconcile_plots, reconcile_zones, PlotReconcileReport, ZoneReconcileReport};
use crate::store::Store;
use crate::upstream::SnapshotSource;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The independently scheduled sync jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobKind {
    #[serde(rename = "plot-sync")]
    Plots,
    #[serde(rename = "zone-sync")]
    Zones,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Plots, JobKind::Zones];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Plots => "plot-sync",
            JobKind::Zones => "zone-sync",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report of a successful pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PassReport {
    Plots(PlotReconcileReport),
    Zones(ZoneReconcileReport),
}

impl PassReport {
    /// Rows written by the pass
    pub fn change_count(&self) -> usize {
        match self {
            PassReport::Plots(report) => {
                report.change_count() + report.history_rows + usize::from(report.aggregate_appended)
            }
            PassReport::Zones(report) => report.upserted.len(),
        }
    }
}

/// One fetch-and-reconcile unit of work
#[async_trait]
pub trait SyncJob: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn run_pass(&self) -> Result<PassReport>;
}

/// Fetch the plot snapshot and reconcile plots, history and aggregates
pub struct PlotSyncJob {
    source: Arc<dyn SnapshotSource>,
    store: Store,
}

impl PlotSyncJob {
    pub fn new(source: Arc<dyn SnapshotSource>, store: Store) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl SyncJob for PlotSyncJob {
    fn kind(&self) -> JobKind {
        JobKind::Plots
    }

    async fn run_pass(&self) -> Result<PassReport> {
        let snapshot: PlotSnapshot = self.source.fetch_plots().await?;
        tracing::debug!(
            plots = snapshot.plots.len(),
            taken_at = ?snapshot.taken_at,
            "Fetched plot snapshot"
        );

        let report = self
            .store
            .run(move |conn| reconcile_plots(conn, &snapshot))
            .await?;

        metrics::record_rows_written("parcelas", report.change_count());
        metrics::record_rows_written("historico_sensores_parcela", report.history_rows);
        metrics::record_rows_written(
            "historico_sensores_globales",
            usize::from(report.aggregate_appended),
        );

        Ok(PassReport::Plots(report))
    }
}

/// Fetch the zone snapshot and upsert every zone
pub struct ZoneSyncJob {
    source: Arc<dyn SnapshotSource>,
    store: Store,
}

impl ZoneSyncJob {
    pub fn new(source: Arc<dyn SnapshotSource>, store: Store) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl SyncJob for ZoneSyncJob {
    fn kind(&self) -> JobKind {
        JobKind::Zones
    }

    async fn run_pass(&self) -> Result<PassReport> {
        let snapshot = self.source.fetch_zones().await?;
        tracing::debug!(zones = snapshot.zones.len(), "Fetched zone snapshot");

        let report = self
            .store
            .run(move |conn| reconcile_zones(conn, &snapshot))
            .await?;

        metrics::record_rows_written("zonas_riego", report.upserted.len());

        Ok(PassReport::Zones(report))
    }
}
