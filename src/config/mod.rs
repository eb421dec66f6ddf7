//! Configuration system
//!
//! Loads ~/.config/fieldsync/config.yaml with support for:
//! - HTTP bind address for the read API
//! - SQLite store location and pragmas
//! - Upstream endpoints and request timeout
//! - Per-job sync intervals and transport backoff cap

mod settings;

pub use settings::{ScheduleConfig, ServerConfig, Settings, StoreSettings, UpstreamConfig};
