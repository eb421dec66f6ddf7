//! Core domain types
//!
//! Typed snapshots produced by the upstream parser and the stored records the
//! reconciler compares them against. Field names are English; the serde names
//! match the Spanish column and payload names the read API exposes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable upstream identifier of a plot or zone
pub type RecordId = i64;

/// One set of sensor measurements
///
/// Used both for the per-plot sensor block and for the global aggregate block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "humedad")]
    pub humidity: f64,
    #[serde(rename = "temperatura")]
    pub temperature: f64,
    #[serde(rename = "lluvia")]
    pub rainfall: f64,
    #[serde(rename = "sol")]
    pub sunlight: f64,
}

impl SensorReading {
    pub fn new(humidity: f64, temperature: f64, rainfall: f64, sunlight: f64) -> Self {
        Self {
            humidity,
            temperature,
            rainfall,
            sunlight,
        }
    }
}

/// A monitored plot as reported by the upstream snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    pub id: RecordId,
    pub name: String,
    pub location: Option<String>,
    pub manager: Option<String>,
    pub crop_type: Option<String>,
    /// Last irrigation timestamp; the only field that gates writes
    pub last_irrigation: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sensor: SensorReading,
}

impl Plot {
    /// Change key used by the change detector
    pub fn change_key(&self) -> &str {
        &self.last_irrigation
    }
}

/// Full result of one plot fetch
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSnapshot {
    /// Upstream timestamp of the aggregate block, if it sent one
    pub taken_at: Option<String>,
    pub aggregate: SensorReading,
    pub plots: Vec<Plot>,
}

/// Plot row as persisted in `parcelas`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPlot {
    pub id: RecordId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "ubicacion")]
    pub location: Option<String>,
    #[serde(rename = "responsable")]
    pub manager: Option<String>,
    #[serde(rename = "tipo_cultivo")]
    pub crop_type: Option<String>,
    #[serde(rename = "ultimo_riego")]
    pub last_irrigation: String,
    #[serde(rename = "latitud")]
    pub latitude: f64,
    #[serde(rename = "longitud")]
    pub longitude: f64,
    pub is_deleted: bool,
    #[serde(rename = "actualizado_en")]
    pub updated_at: String,
}

impl StoredPlot {
    pub fn change_key(&self) -> &str {
        &self.last_irrigation
    }
}

/// Row of `historico_sensores_parcela`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotHistoryRow {
    pub id: i64,
    #[serde(rename = "parcela_id")]
    pub plot_id: RecordId,
    #[serde(flatten)]
    pub reading: SensorReading,
    #[serde(rename = "fecha_registro")]
    pub recorded_at: String,
}

/// Row of `historico_sensores_globales`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub id: i64,
    #[serde(rename = "humedad_global")]
    pub humidity: f64,
    #[serde(rename = "temperatura_global")]
    pub temperature: f64,
    #[serde(rename = "lluvia_global")]
    pub rainfall: f64,
    #[serde(rename = "sol_global")]
    pub sunlight: f64,
    #[serde(rename = "fecha_registro")]
    pub recorded_at: String,
}

impl AggregateRow {
    pub fn reading(&self) -> SensorReading {
        SensorReading::new(self.humidity, self.temperature, self.rainfall, self.sunlight)
    }
}

/// Irrigation zone status, always stored lower case
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ZoneStatus {
    Maintenance,
    Broken,
    OutOfService,
    Off,
    /// Any other status the upstream reports, e.g. "activo"
    Other(String),
}

/// Statuses that count as not functioning
pub const OUT_OF_SERVICE_STATUSES: [&str; 4] =
    ["mantenimiento", "descompuesto", "fuera_de_servicio", "apagado"];

impl ZoneStatus {
    /// Normalize a raw status to lower case; blank input has no status
    ///
    /// Surrounding whitespace is trimmed too, so `" Activo "` and `"activo"`
    /// land in the same status bucket.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "mantenimiento" => Some(ZoneStatus::Maintenance),
            "descompuesto" => Some(ZoneStatus::Broken),
            "fuera_de_servicio" => Some(ZoneStatus::OutOfService),
            "apagado" => Some(ZoneStatus::Off),
            _ => Some(ZoneStatus::Other(normalized)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ZoneStatus::Maintenance => "mantenimiento",
            ZoneStatus::Broken => "descompuesto",
            ZoneStatus::OutOfService => "fuera_de_servicio",
            ZoneStatus::Off => "apagado",
            ZoneStatus::Other(s) => s,
        }
    }

}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ZoneStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An irrigation zone, already normalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub id: RecordId,
    pub sector: Option<String>,
    #[serde(rename = "nombre")]
    pub name: Option<String>,
    #[serde(rename = "tipo_riego")]
    pub irrigation_type: Option<String>,
    #[serde(rename = "estado")]
    pub status: Option<ZoneStatus>,
    #[serde(rename = "latitud")]
    pub latitude: Option<f64>,
    #[serde(rename = "longitud")]
    pub longitude: Option<f64>,
    #[serde(rename = "motivo")]
    pub reason: Option<String>,
    #[serde(rename = "fecha")]
    pub date: Option<String>,
    pub color: Option<String>,
}

/// Full result of one zone fetch
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSnapshot {
    pub zones: Vec<Zone>,
}

/// Zone row as persisted in `zonas_riego`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredZone {
    #[serde(flatten)]
    pub zone: Zone,
    #[serde(rename = "actualizado_en")]
    pub updated_at: String,
}
