//! Irrigation zone statements

use super::plots::collect;
use super::sqlite::now_sql;
use crate::error::StoreContext;
use crate::model::{StoredZone, Zone, ZoneStatus, OUT_OF_SERVICE_STATUSES};
use crate::Result;
use rusqlite::{params, Connection, Row};

/// Which zones a read should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneFilter {
    All,
    /// Zones without an out-of-service status, including zones with no status at all
    Functioning,
    NotFunctioning,
    /// Exact status, compared case-insensitively
    Status(String),
}

/// Insert a zone or overwrite every field of the existing row with the same id
pub fn upsert_zone(conn: &Connection, zone: &Zone) -> Result<()> {
    const SQL: &str = concat!(
        r#"
        INSERT INTO zonas_riego (id, sector, nombre, tipo_riego, estado, latitud, longitud,
                                 motivo, fecha, color)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            sector = excluded.sector,
            nombre = excluded.nombre,
            tipo_riego = excluded.tipo_riego,
            estado = excluded.estado,
            latitud = excluded.latitud,
            longitud = excluded.longitud,
            motivo = excluded.motivo,
            fecha = excluded.fecha,
            color = excluded.color,
            actualizado_en = "#,
        now_sql!()
    );
    conn.execute(
        SQL,
        params![
            zone.id,
            zone.sector.as_deref(),
            zone.name.as_deref(),
            zone.irrigation_type.as_deref(),
            zone.status.as_ref().map(ZoneStatus::as_str),
            zone.latitude,
            zone.longitude,
            zone.reason.as_deref(),
            zone.date.as_deref(),
            zone.color.as_deref(),
        ],
    )
    .statement(SQL)?;
    Ok(())
}

fn zone_from_row(row: &Row<'_>) -> rusqlite::Result<StoredZone> {
    let status: Option<String> = row.get(4)?;
    Ok(StoredZone {
        zone: Zone {
            id: row.get(0)?,
            sector: row.get(1)?,
            name: row.get(2)?,
            irrigation_type: row.get(3)?,
            status: status.as_deref().and_then(ZoneStatus::parse),
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            reason: row.get(7)?,
            date: row.get(8)?,
            color: row.get(9)?,
        },
        updated_at: row.get(10)?,
    })
}

/// Read zones matching a filter, ordered by id
pub fn list_zones(conn: &Connection, filter: &ZoneFilter) -> Result<Vec<StoredZone>> {
    const COLUMNS: &str = "SELECT id, sector, nombre, tipo_riego, estado, latitud, longitud, \
                           motivo, fecha, color, actualizado_en FROM zonas_riego";

    let out_of_service = OUT_OF_SERVICE_STATUSES
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ");

    match filter {
        ZoneFilter::All => {
            let sql = format!("{} ORDER BY id", COLUMNS);
            collect(conn, &sql, [], zone_from_row)
        }
        ZoneFilter::Functioning => {
            // LOWER(NULL) NOT IN (...) is NULL, so zones without a status need their own arm
            let sql = format!(
                "{} WHERE estado IS NULL OR LOWER(estado) NOT IN ({}) ORDER BY id",
                COLUMNS, out_of_service
            );
            collect(conn, &sql, [], zone_from_row)
        }
        ZoneFilter::NotFunctioning => {
            let sql = format!(
                "{} WHERE LOWER(estado) IN ({}) ORDER BY id",
                COLUMNS, out_of_service
            );
            collect(conn, &sql, [], zone_from_row)
        }
        ZoneFilter::Status(status) => {
            let sql = format!("{} WHERE LOWER(estado) = ?1 ORDER BY id", COLUMNS);
            collect(conn, &sql, [status.trim().to_lowercase()], zone_from_row)
        }
    }
}
