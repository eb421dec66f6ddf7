//! HTTP client for the upstream telemetry service

use crate::config::UpstreamConfig;
use crate::model::{PlotSnapshot, ZoneSnapshot};
use crate::{Result, SyncError};
use async_trait::async_trait;

/// Source of upstream snapshots
///
/// One call per job type, no internal retries. Implementations must not touch
/// the local store.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the latest plot and aggregate sensor snapshot
    async fn fetch_plots(&self) -> Result<PlotSnapshot>;

    /// Fetch the latest irrigation zone snapshot
    async fn fetch_zones(&self) -> Result<ZoneSnapshot>;
}

/// reqwest-backed snapshot source
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    plots_url: String,
    zones_url: String,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    /// Create a source from the upstream config section
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("fieldsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            plots_url: config.plots_url.clone(),
            zones_url: config.zones_url.clone(),
            client,
        })
    }

    /// Create with explicit endpoints and a default client
    pub fn new(plots_url: impl Into<String>, zones_url: impl Into<String>) -> Self {
        Self {
            plots_url: plots_url.into(),
            zones_url: zones_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// GET a URL and return the body of a 2xx response
    async fn get_body(&self, url: &str) -> Result<String> {
        tracing::debug!(url = url, "Fetching upstream snapshot");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_plots(&self) -> Result<PlotSnapshot> {
        let body = self.get_body(&self.plots_url).await?;
        let snapshot = PlotSnapshot::from_json(&body)?;

        tracing::info!(
            plots = snapshot.plots.len(),
            sensors_taken_at = snapshot.taken_at.as_deref().unwrap_or("-"),
            "Plot snapshot received"
        );
        Ok(snapshot)
    }

    async fn fetch_zones(&self) -> Result<ZoneSnapshot> {
        let body = self.get_body(&self.zones_url).await?;
        let snapshot = ZoneSnapshot::from_json(&body)?;

        tracing::info!(zones = snapshot.zones.len(), "Zone snapshot received");
        Ok(snapshot)
    }
}
