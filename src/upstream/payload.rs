//! Validated parsing of upstream snapshots
//!
//! The upstream service is loose with types: ids and coordinates arrive as numbers
//! or as numeric strings depending on the record. Everything is checked here, once,
//! before any reconciliation runs. Values that cannot be read unambiguously are a
//! `SchemaError` rather than a silent coercion.

use crate::model::{Plot, PlotSnapshot, RecordId, SensorReading, Zone, ZoneSnapshot, ZoneStatus};
use crate::{Result, SyncError};
use serde_json::{Map, Value};
use std::collections::HashSet;

impl PlotSnapshot {
    /// Parse a plot snapshot body
    ///
    /// Expected shape: `{ sensores: {...}, parcelas: [...] }`
    pub fn from_json(body: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(body)?;
        let root = Fields::root(&root)?;

        let sensors = root.object("sensores")?;
        let taken_at = sensors.optional_string("fecha")?;
        let aggregate = sensors.reading()?;

        let mut plots = Vec::new();
        let mut seen = HashSet::new();
        for (index, item) in root.array("parcelas")?.iter().enumerate() {
            let fields = Fields::element(item, format!("parcelas[{}]", index))?;
            let plot = parse_plot(&fields)?;
            if !seen.insert(plot.id) {
                return Err(SyncError::Schema(format!(
                    "parcelas[{}]: duplicate id {}",
                    index, plot.id
                )));
            }
            plots.push(plot);
        }

        Ok(Self {
            taken_at,
            aggregate,
            plots,
        })
    }

    /// Ids present in this snapshot, in snapshot order
    pub fn plot_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.plots.iter().map(|p| p.id)
    }
}

fn parse_plot(fields: &Fields<'_>) -> Result<Plot> {
    Ok(Plot {
        id: fields.required_id("id")?,
        name: fields.required_string("nombre")?,
        location: fields.optional_string("ubicacion")?,
        manager: fields.optional_string("responsable")?,
        crop_type: fields.optional_string("tipo_cultivo")?,
        last_irrigation: fields.required_string("ultimo_riego")?,
        latitude: fields.required_number("latitud")?,
        longitude: fields.required_number("longitud")?,
        sensor: fields.object("sensor")?.reading()?,
    })
}

impl ZoneSnapshot {
    /// Parse a zone snapshot body
    ///
    /// Expected shape: `{ zonas: [...] }`
    pub fn from_json(body: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(body)?;
        let root = Fields::root(&root)?;

        let mut zones = Vec::new();
        let mut seen = HashSet::new();
        for (index, item) in root.array("zonas")?.iter().enumerate() {
            let fields = Fields::element(item, format!("zonas[{}]", index))?;
            let zone = parse_zone(&fields)?;
            if !seen.insert(zone.id) {
                return Err(SyncError::Schema(format!(
                    "zonas[{}]: duplicate id {}",
                    index, zone.id
                )));
            }
            zones.push(zone);
        }

        Ok(Self { zones })
    }
}

fn parse_zone(fields: &Fields<'_>) -> Result<Zone> {
    let status = fields
        .optional_string("estado")?
        .and_then(|raw| ZoneStatus::parse(&raw));

    Ok(Zone {
        id: fields.required_id("id")?,
        sector: fields.optional_string("sector")?,
        name: fields.optional_string("nombre")?,
        irrigation_type: fields.optional_string("tipo_riego")?,
        status,
        latitude: fields.optional_number("latitud")?,
        longitude: fields.optional_number("longitud")?,
        reason: fields.optional_nonempty_string("motivo")?,
        date: fields.optional_nonempty_string("fecha")?,
        color: fields.optional_nonempty_string("color")?,
    })
}

/// A JSON object together with its path, for error messages
struct Fields<'a> {
    path: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn root(value: &'a Value) -> Result<Self> {
        Self::element(value, "$".to_string())
    }

    fn element(value: &'a Value, path: String) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self { path, map }),
            other => Err(SyncError::Schema(format!(
                "{}: expected object, found {}",
                path,
                type_name(other)
            ))),
        }
    }

    fn field_path(&self, key: &str) -> String {
        if self.path == "$" {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    fn required(&self, key: &str) -> Result<&'a Value> {
        self.present(key)
            .ok_or_else(|| SyncError::Schema(format!("{}: missing", self.field_path(key))))
    }

    fn object(&self, key: &str) -> Result<Fields<'a>> {
        Fields::element(self.required(key)?, self.field_path(key))
    }

    fn array(&self, key: &str) -> Result<&'a Vec<Value>> {
        match self.required(key)? {
            Value::Array(items) => Ok(items),
            other => Err(self.mismatch(key, "array", other)),
        }
    }

    fn required_id(&self, key: &str) -> Result<RecordId> {
        let value = self.required(key)?;
        let id = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        id.ok_or_else(|| self.mismatch(key, "integer id", value))
    }

    fn required_number(&self, key: &str) -> Result<f64> {
        let value = self.required(key)?;
        self.number(key, value)?
            .ok_or_else(|| SyncError::Schema(format!("{}: missing", self.field_path(key))))
    }

    /// Absent, null and blank strings are `None`; anything else must be numeric
    fn optional_number(&self, key: &str) -> Result<Option<f64>> {
        match self.present(key) {
            None => Ok(None),
            Some(value) => self.number(key, value),
        }
    }

    fn number(&self, key: &str, value: &Value) -> Result<Option<f64>> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(self.mismatch(key, "number", value)),
        }
    }

    fn required_string(&self, key: &str) -> Result<String> {
        match self.required(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(key, "string", other)),
        }
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.mismatch(key, "string", other)),
        }
    }

    fn optional_nonempty_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.optional_string(key)?.filter(|s| !s.is_empty()))
    }

    fn reading(&self) -> Result<SensorReading> {
        Ok(SensorReading {
            humidity: self.required_number("humedad")?,
            temperature: self.required_number("temperatura")?,
            rainfall: self.required_number("lluvia")?,
            sunlight: self.required_number("sol")?,
        })
    }

    fn mismatch(&self, key: &str, expected: &str, found: &Value) -> SyncError {
        SyncError::Schema(format!(
            "{}: expected {}, found {}",
            self.field_path(key),
            expected,
            describe(found)
        ))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {:?}", s),
        Value::Number(n) => format!("number {}", n),
        other => type_name(other).to_string(),
    }
}
