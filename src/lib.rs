//! fieldsync - Reconciliation service for farm plot sensors and irrigation zones
//!
//! Periodically pulls full snapshots of plots (with sensor readings) and irrigation
//! zones from an upstream HTTP service and reconciles them into a local SQLite
//! store, keeping append-only sensor history and a read API on top.
//!
//! # Architecture
//!
//! - **upstream**: Snapshot fetching and payload parsing
//! - **reconcile**: Change detection and transactional reconciliation passes
//! - **store**: SQLite persistence and read queries
//! - **scheduler**: Per-job timers, run guards, backoff and metrics
//! - **server**: HTTP read API and manual sync triggers
//! - **config**: YAML configuration

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod upstream;

// Re-exports
pub use error::{Result, SyncError};
