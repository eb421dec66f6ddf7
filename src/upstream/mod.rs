//! Upstream snapshot fetching
//!
//! Talks to the remote irrigation telemetry service:
//! - plot endpoint: per-plot metadata, sensor block and a global aggregate block
//! - zone endpoint: irrigation zone status
//!
//! Bodies are parsed into typed snapshots (see [`crate::model`]) before anything
//! else sees them.

mod client;
mod payload;

pub use client::{HttpSnapshotSource, SnapshotSource};
