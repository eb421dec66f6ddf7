//! Plot reconciliation pass
//!
//! One pass applies a whole [`PlotSnapshot`] inside a single transaction:
//! per-plot upserts and history appends in snapshot order, then the soft-delete
//! sweep, then the aggregate append. Dropping the transaction on any error rolls
//! every write of the pass back.

use super::detect::{aggregate_changed, plot_action, PlotAction};
use crate::error::StoreContext;
use crate::model::{PlotSnapshot, RecordId};
use crate::store::plots;
use crate::Result;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of one plot pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PlotReconcileReport {
    /// Plots seen for the first time
    pub inserted: Vec<RecordId>,

    /// Plots whose change key moved
    pub updated: Vec<RecordId>,

    /// Previously soft-deleted plots that reappeared with the same change key
    pub restored: Vec<RecordId>,

    /// Plots absent from the snapshot and now soft-deleted
    pub soft_deleted: Vec<RecordId>,

    /// Plots left untouched
    pub unchanged: usize,

    /// History rows appended
    pub history_rows: usize,

    /// Whether a new aggregate row was appended
    pub aggregate_appended: bool,
}

impl PlotReconcileReport {
    /// Check if the pass wrote anything
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0 || self.aggregate_appended
    }

    /// Number of plot rows written
    pub fn change_count(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.restored.len() + self.soft_deleted.len()
    }
}

/// Apply a plot snapshot atomically
pub fn reconcile_plots(conn: &mut Connection, snapshot: &PlotSnapshot) -> Result<PlotReconcileReport> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .statement("BEGIN IMMEDIATE")?;

    let report = apply_plots(&tx, snapshot)?;

    tx.commit().statement("COMMIT")?;
    Ok(report)
}

/// Issue every write of a plot pass on `conn`
///
/// Callers own the transaction; see [`reconcile_plots`].
fn apply_plots(conn: &Connection, snapshot: &PlotSnapshot) -> Result<PlotReconcileReport> {
    let mut report = PlotReconcileReport::default();
    let incoming_ids: HashSet<RecordId> = snapshot.plot_ids().collect();

    for plot in &snapshot.plots {
        let stored = plots::find_plot(conn, plot.id)?;
        let action = plot_action(stored.as_ref(), plot);
        tracing::debug!(
            plot_id = plot.id,
            change_key = plot.change_key(),
            ?action,
            "Plot decision"
        );

        match action {
            PlotAction::Insert => {
                plots::insert_plot(conn, plot)?;
                plots::append_plot_history(conn, plot.id, &plot.sensor)?;
                report.inserted.push(plot.id);
                report.history_rows += 1;
            }
            PlotAction::Update => {
                plots::update_plot(conn, plot)?;
                plots::append_plot_history(conn, plot.id, &plot.sensor)?;
                report.updated.push(plot.id);
                report.history_rows += 1;
            }
            PlotAction::Restore => {
                plots::set_plot_deleted(conn, plot.id, false)?;
                report.restored.push(plot.id);
            }
            PlotAction::Unchanged => {
                report.unchanged += 1;
            }
        }
    }

    // Sweep runs after every upsert so nothing touched above is flagged here
    for id in plots::active_plot_ids(conn)? {
        if !incoming_ids.contains(&id) {
            tracing::info!(plot_id = id, "Marking plot as deleted");
            plots::set_plot_deleted(conn, id, true)?;
            report.soft_deleted.push(id);
        }
    }

    let latest = plots::latest_aggregate(conn)?.map(|row| row.reading());
    if aggregate_changed(latest.as_ref(), &snapshot.aggregate) {
        plots::append_aggregate(conn, &snapshot.aggregate)?;
        report.aggregate_appended = true;
    }

    Ok(report)
}
