//! Relational store
//!
//! SQLite-backed persistence for plots, their sensor history, global aggregate
//! readings and irrigation zones. Tables and columns keep the upstream's Spanish
//! names so the read API returns rows in the shape consumers already know.
//!
//! Write statements are only ever issued by the reconciler, inside one
//! transaction per pass.

pub mod plots;
mod sqlite;
pub mod zones;

pub use sqlite::{last_writes, table_counts, LastWrites, Store, StoreConfig, TableCounts};
pub use zones::ZoneFilter;

use crate::model::{AggregateRow, PlotHistoryRow, StoredPlot, StoredZone};
use crate::Result;
use rusqlite::Connection;
use serde::Serialize;

/// Full contents of every table, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct Dump {
    pub parcelas: Vec<StoredPlot>,
    pub historico: Vec<PlotHistoryRow>,
    pub globales: Vec<AggregateRow>,
    pub zonas: Vec<StoredZone>,
}

/// Read every table in one consistent snapshot
pub fn dump(conn: &mut Connection) -> Result<Dump> {
    use crate::error::StoreContext;

    let tx = conn.transaction().statement("BEGIN")?;
    let dump = Dump {
        parcelas: plots::all_plots(&tx)?,
        historico: plots::all_plot_history(&tx)?,
        globales: plots::aggregate_history(&tx)?,
        zonas: zones::list_zones(&tx, &ZoneFilter::All)?,
    };
    tx.commit().statement("COMMIT")?;
    Ok(dump)
}
