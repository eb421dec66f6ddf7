//! SQLite store implementation

use crate::config::StoreSettings;
use crate::error::StoreContext;
use crate::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode so read requests never wait on a sync transaction
    pub wal_mode: bool,

    /// How long a connection waits for a lock before failing
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&StoreSettings> for StoreConfig {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            path: settings.path.clone(),
            wal_mode: settings.wal_mode,
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
        }
    }
}

/// Server-side timestamp expression, millisecond precision, UTC
macro_rules! now_sql {
    () => {
        "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
    };
}
pub(crate) use now_sql;

const SCHEMA: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS parcelas (
        id INTEGER PRIMARY KEY,
        nombre TEXT NOT NULL,
        ubicacion TEXT,
        responsable TEXT,
        tipo_cultivo TEXT,
        ultimo_riego TEXT NOT NULL,
        latitud REAL NOT NULL,
        longitud REAL NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        actualizado_en TEXT NOT NULL DEFAULT ("#,
    now_sql!(),
    r#")
    );

    CREATE TABLE IF NOT EXISTS historico_sensores_parcela (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parcela_id INTEGER NOT NULL REFERENCES parcelas(id),
        humedad REAL NOT NULL,
        temperatura REAL NOT NULL,
        lluvia REAL NOT NULL,
        sol REAL NOT NULL,
        fecha_registro TEXT NOT NULL DEFAULT ("#,
    now_sql!(),
    r#")
    );

    CREATE TABLE IF NOT EXISTS historico_sensores_globales (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        humedad_global REAL NOT NULL,
        temperatura_global REAL NOT NULL,
        lluvia_global REAL NOT NULL,
        sol_global REAL NOT NULL,
        fecha_registro TEXT NOT NULL DEFAULT ("#,
    now_sql!(),
    r#")
    );

    CREATE TABLE IF NOT EXISTS zonas_riego (
        id INTEGER PRIMARY KEY,
        sector TEXT,
        nombre TEXT,
        tipo_riego TEXT,
        estado TEXT,
        latitud REAL,
        longitud REAL,
        motivo TEXT,
        fecha TEXT,
        color TEXT,
        actualizado_en TEXT NOT NULL DEFAULT ("#,
    now_sql!(),
    r#")
    );

    CREATE INDEX IF NOT EXISTS idx_parcelas_deleted ON parcelas(is_deleted);
    CREATE INDEX IF NOT EXISTS idx_historico_parcela ON historico_sensores_parcela(parcela_id, fecha_registro);
    CREATE INDEX IF NOT EXISTS idx_zonas_estado ON zonas_riego(estado);
    "#
);

/// Handle to the SQLite store
///
/// Cheap to clone. Every pass and every read request opens its own connection,
/// so a long sync transaction never blocks the read API in WAL mode.
#[derive(Debug, Clone)]
pub struct Store {
    config: Arc<StoreConfig>,
}

impl Store {
    /// Open or create the database and make sure the schema exists
    pub fn open(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening store");

        let store = Self {
            config: Arc::new(config),
        };

        let conn = store.connect()?;
        conn.execute_batch(SCHEMA).statement("CREATE TABLE IF NOT EXISTS ...")?;

        Ok(store)
    }

    /// Open a fresh connection with the store pragmas applied
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.path).statement("open database")?;

        conn.busy_timeout(self.config.busy_timeout)
            .statement("PRAGMA busy_timeout")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .statement("PRAGMA foreign_keys = ON")?;
        if self.config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .statement("PRAGMA journal_mode = WAL")?;
        }

        Ok(conn)
    }

    /// Run blocking database work off the async runtime
    ///
    /// The closure gets its own connection, released when it returns.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connect()?;
            work(&mut conn)
        })
        .await?
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

/// Most recent write per table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastWrites {
    pub parcelas: Option<String>,
    pub historico_sensores_parcela: Option<String>,
    pub historico_sensores_globales: Option<String>,
    pub zonas_riego: Option<String>,
}

/// Read the latest write timestamp of every table
pub fn last_writes(conn: &Connection) -> Result<LastWrites> {
    const PLOTS: &str = "SELECT MAX(actualizado_en) FROM parcelas";
    const HISTORY: &str = "SELECT MAX(fecha_registro) FROM historico_sensores_parcela";
    const AGGREGATES: &str = "SELECT MAX(fecha_registro) FROM historico_sensores_globales";
    const ZONES: &str = "SELECT MAX(actualizado_en) FROM zonas_riego";

    let max = |sql: &str| -> Result<Option<String>> {
        conn.query_row(sql, [], |row| row.get::<_, Option<String>>(0))
            .optional()
            .statement(sql)
            .map(Option::flatten)
    };

    Ok(LastWrites {
        parcelas: max(PLOTS)?,
        historico_sensores_parcela: max(HISTORY)?,
        historico_sensores_globales: max(AGGREGATES)?,
        zonas_riego: max(ZONES)?,
    })
}

/// Row counts, for logs and the `sync` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub parcelas: i64,
    pub parcelas_eliminadas: i64,
    pub historico_sensores_parcela: i64,
    pub historico_sensores_globales: i64,
    pub zonas_riego: i64,
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0)).statement(sql)
    };

    Ok(TableCounts {
        parcelas: count("SELECT COUNT(*) FROM parcelas WHERE is_deleted = 0")?,
        parcelas_eliminadas: count("SELECT COUNT(*) FROM parcelas WHERE is_deleted = 1")?,
        historico_sensores_parcela: count("SELECT COUNT(*) FROM historico_sensores_parcela")?,
        historico_sensores_globales: count("SELECT COUNT(*) FROM historico_sensores_globales")?,
        zonas_riego: count("SELECT COUNT(*) FROM zonas_riego")?,
    })
}
