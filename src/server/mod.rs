//! HTTP API
//!
//! Read-only JSON views over the store, plus manual triggers for the two sync jobs.
//!
//! # Routes
//!
//! - `GET /api/parcelas` - Active plots
//! - `GET /api/parcelas/eliminadas` - Soft-deleted plots
//! - `GET /api/historico/parcelas/{id}` - Sensor history of one plot, oldest first
//! - `GET /api/historico/globales` - Global aggregate readings, oldest first
//! - `GET /api/zonas-riego` - All irrigation zones
//! - `GET /api/zonas-riego/funcionando` - Zones not out of service
//! - `GET /api/zonas-riego/no-funcionando` - Zones out of service
//! - `GET /api/zonas-riego/estado/{estado}` - Zones with the given status
//! - `GET /api/dump` - Every table
//! - `GET|POST /api/update-data` - Run a plot-sync pass now
//! - `GET|POST /api/update-zonas` - Run a zone-sync pass now
//! - `GET /api/update-status` - Last writes and scheduler state
//! - `GET /health`, `GET /metrics`

mod routes;

use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::{Result, SyncError};
use axum::{
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub use routes::ErrorResponse;

/// Shared handler state
pub struct AppState {
    pub store: Store,
    pub scheduler: Scheduler,
}

/// HTTP server for the sync service
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(store: Store, scheduler: Scheduler) -> Self {
        Self {
            state: Arc::new(AppState { store, scheduler }),
        }
    }

    /// Build the router
    pub fn router(state: Arc<AppState>) -> Router {
        let api = Router::new()
            .route("/parcelas", get(routes::active_plots))
            .route("/parcelas/eliminadas", get(routes::deleted_plots))
            .route("/historico/parcelas/{id}", get(routes::plot_history))
            .route("/historico/globales", get(routes::aggregate_history))
            .route("/zonas-riego", get(routes::all_zones))
            .route("/zonas-riego/funcionando", get(routes::functioning_zones))
            .route("/zonas-riego/no-funcionando", get(routes::not_functioning_zones))
            .route("/zonas-riego/estado/{estado}", get(routes::zones_by_status))
            .route("/dump", get(routes::dump))
            .route("/update-data", get(routes::update_plots).post(routes::update_plots))
            .route("/update-zonas", get(routes::update_zones).post(routes::update_zones))
            .route("/update-status", get(routes::update_status));

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .nest("/api", api)
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn run<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = addr, db = %self.state.store.path().display(), "API server listening");

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
