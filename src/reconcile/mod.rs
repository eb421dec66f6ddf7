//! Reconciliation engine
//!
//! Decides, per upstream record, whether the local store is stale and applies the
//! minimal set of writes:
//!
//! - **plots**: change-key gated upserts, append-only sensor history, soft deletion
//!   of plots missing from the snapshot, append-only global aggregates
//! - **zones**: unconditional merge-on-conflict upserts, no history, no deletion
//!
//! Each pass runs in exactly one transaction.

pub mod detect;
mod plots;
mod zones;

pub use detect::{aggregate_changed, plot_action, should_update, PlotAction};
pub use plots::{reconcile_plots, PlotReconcileReport};
pub use zones::{reconcile_zones, ZoneReconcileReport};
