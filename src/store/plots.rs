//! Plot, plot history and aggregate reading statements
//!
//! All functions take a plain `&Connection` so they work both on a pooled
//! connection and inside a `Transaction` (which derefs to one).

use super::sqlite::now_sql;
use crate::error::StoreContext;
use crate::model::{AggregateRow, Plot, PlotHistoryRow, RecordId, SensorReading, StoredPlot};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const PLOT_COLUMNS: &str = "id, nombre, ubicacion, responsable, tipo_cultivo, ultimo_riego, \
                            latitud, longitud, is_deleted, actualizado_en";

fn plot_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPlot> {
    Ok(StoredPlot {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        manager: row.get(3)?,
        crop_type: row.get(4)?,
        last_irrigation: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        is_deleted: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Look up a stored plot by id, deleted or not
pub fn find_plot(conn: &Connection, id: RecordId) -> Result<Option<StoredPlot>> {
    let sql = format!("SELECT {} FROM parcelas WHERE id = ?1", PLOT_COLUMNS);
    conn.query_row(&sql, [id], plot_from_row)
        .optional()
        .statement(&sql)
}

/// Insert a plot first seen in this snapshot
pub fn insert_plot(conn: &Connection, plot: &Plot) -> Result<()> {
    const SQL: &str = r#"
        INSERT INTO parcelas (id, nombre, ubicacion, responsable, tipo_cultivo,
                              ultimo_riego, latitud, longitud, is_deleted)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
    "#;
    conn.execute(
        SQL,
        params![
            plot.id,
            &plot.name,
            plot.location.as_deref(),
            plot.manager.as_deref(),
            plot.crop_type.as_deref(),
            &plot.last_irrigation,
            plot.latitude,
            plot.longitude,
        ],
    )
    .statement(SQL)?;
    Ok(())
}

/// Overwrite every mutable field of an existing plot and clear its deletion flag
pub fn update_plot(conn: &Connection, plot: &Plot) -> Result<()> {
    const SQL: &str = concat!(
        r#"
        UPDATE parcelas
           SET nombre = ?2, ubicacion = ?3, responsable = ?4, tipo_cultivo = ?5,
               ultimo_riego = ?6, latitud = ?7, longitud = ?8, is_deleted = 0,
               actualizado_en = "#,
        now_sql!(),
        r#"
         WHERE id = ?1
    "#
    );
    conn.execute(
        SQL,
        params![
            plot.id,
            &plot.name,
            plot.location.as_deref(),
            plot.manager.as_deref(),
            plot.crop_type.as_deref(),
            &plot.last_irrigation,
            plot.latitude,
            plot.longitude,
        ],
    )
    .statement(SQL)?;
    Ok(())
}

/// Set or clear the soft-delete flag of one plot
pub fn set_plot_deleted(conn: &Connection, id: RecordId, deleted: bool) -> Result<()> {
    const SQL: &str = concat!(
        "UPDATE parcelas SET is_deleted = ?2, actualizado_en = ",
        now_sql!(),
        " WHERE id = ?1"
    );
    conn.execute(SQL, params![id, deleted]).statement(SQL)?;
    Ok(())
}

/// Ids of every plot not currently soft-deleted
pub fn active_plot_ids(conn: &Connection) -> Result<Vec<RecordId>> {
    const SQL: &str = "SELECT id FROM parcelas WHERE is_deleted = 0 ORDER BY id";
    let mut stmt = conn.prepare(SQL).statement(SQL)?;
    let ids = stmt
        .query_map([], |row| row.get(0))
        .statement(SQL)?
        .collect::<rusqlite::Result<Vec<RecordId>>>()
        .statement(SQL)?;
    Ok(ids)
}

/// Append one sensor history row for a plot
pub fn append_plot_history(conn: &Connection, plot_id: RecordId, reading: &SensorReading) -> Result<()> {
    const SQL: &str = r#"
        INSERT INTO historico_sensores_parcela (parcela_id, humedad, temperatura, lluvia, sol)
        VALUES (?1, ?2, ?3, ?4, ?5)
    "#;
    conn.execute(
        SQL,
        params![
            plot_id,
            reading.humidity,
            reading.temperature,
            reading.rainfall,
            reading.sunlight,
        ],
    )
    .statement(SQL)?;
    Ok(())
}

/// Most recently stored aggregate reading
pub fn latest_aggregate(conn: &Connection) -> Result<Option<AggregateRow>> {
    const SQL: &str = r#"
        SELECT id, humedad_global, temperatura_global, lluvia_global, sol_global, fecha_registro
          FROM historico_sensores_globales
         ORDER BY fecha_registro DESC, id DESC
         LIMIT 1
    "#;
    conn.query_row(SQL, [], aggregate_from_row)
        .optional()
        .statement(SQL)
}

/// Append one aggregate reading
pub fn append_aggregate(conn: &Connection, reading: &SensorReading) -> Result<()> {
    const SQL: &str = r#"
        INSERT INTO historico_sensores_globales
            (humedad_global, temperatura_global, lluvia_global, sol_global)
        VALUES (?1, ?2, ?3, ?4)
    "#;
    conn.execute(
        SQL,
        params![
            reading.humidity,
            reading.temperature,
            reading.rainfall,
            reading.sunlight,
        ],
    )
    .statement(SQL)?;
    Ok(())
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        id: row.get(0)?,
        humidity: row.get(1)?,
        temperature: row.get(2)?,
        rainfall: row.get(3)?,
        sunlight: row.get(4)?,
        recorded_at: row.get(5)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<PlotHistoryRow> {
    Ok(PlotHistoryRow {
        id: row.get(0)?,
        plot_id: row.get(1)?,
        reading: SensorReading {
            humidity: row.get(2)?,
            temperature: row.get(3)?,
            rainfall: row.get(4)?,
            sunlight: row.get(5)?,
        },
        recorded_at: row.get(6)?,
    })
}

/// Plots filtered on the deletion flag
pub fn list_plots(conn: &Connection, deleted: bool) -> Result<Vec<StoredPlot>> {
    let sql = format!(
        "SELECT {} FROM parcelas WHERE is_deleted = ?1 ORDER BY id",
        PLOT_COLUMNS
    );
    collect(conn, &sql, params![deleted], plot_from_row)
}

/// Every plot, for the diagnostics dump
pub fn all_plots(conn: &Connection) -> Result<Vec<StoredPlot>> {
    let sql = format!("SELECT {} FROM parcelas ORDER BY id", PLOT_COLUMNS);
    collect(conn, &sql, [], plot_from_row)
}

/// Sensor history of one plot, oldest first
pub fn plot_history(conn: &Connection, plot_id: RecordId) -> Result<Vec<PlotHistoryRow>> {
    const SQL: &str = r#"
        SELECT id, parcela_id, humedad, temperatura, lluvia, sol, fecha_registro
          FROM historico_sensores_parcela
         WHERE parcela_id = ?1
         ORDER BY fecha_registro ASC, id ASC
    "#;
    collect(conn, SQL, [plot_id], history_from_row)
}

/// Sensor history of every plot, oldest first
pub fn all_plot_history(conn: &Connection) -> Result<Vec<PlotHistoryRow>> {
    const SQL: &str = r#"
        SELECT id, parcela_id, humedad, temperatura, lluvia, sol, fecha_registro
          FROM historico_sensores_parcela
         ORDER BY fecha_registro ASC, id ASC
    "#;
    collect(conn, SQL, [], history_from_row)
}

/// Aggregate readings, oldest first
pub fn aggregate_history(conn: &Connection) -> Result<Vec<AggregateRow>> {
    const SQL: &str = r#"
        SELECT id, humedad_global, temperatura_global, lluvia_global, sol_global, fecha_registro
          FROM historico_sensores_globales
         ORDER BY fecha_registro ASC, id ASC
    "#;
    collect(conn, SQL, [], aggregate_from_row)
}

pub(super) fn collect<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Vec<T>>
where
    P: rusqlite::Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql).statement(sql)?;
    let rows = stmt
        .query_map(params, map)
        .statement(sql)?
        .collect::<rusqlite::Result<Vec<T>>>()
        .statement(sql)?;
    Ok(rows)
}
