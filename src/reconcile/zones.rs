//! Zone reconciliation pass
//!
//! Zones carry no history: every zone in the snapshot is upserted as-is, in one
//! transaction for the whole batch. Zones missing from the snapshot are left alone.

use crate::error::StoreContext;
use crate::model::{RecordId, ZoneSnapshot};
use crate::store::zones;
use crate::Result;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

/// Outcome of one zone pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneReconcileReport {
    /// Zones written, in snapshot order
    pub upserted: Vec<RecordId>,
}

/// Upsert every zone of the snapshot atomically
pub fn reconcile_zones(conn: &mut Connection, snapshot: &ZoneSnapshot) -> Result<ZoneReconcileReport> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .statement("BEGIN IMMEDIATE")?;

    let mut report = ZoneReconcileReport::default();
    for zone in &snapshot.zones {
        zones::upsert_zone(&tx, zone)?;
        report.upserted.push(zone.id);
    }

    tx.commit().statement("COMMIT")?;
    Ok(report)
}
