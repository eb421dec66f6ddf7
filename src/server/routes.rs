//! Request handlers

use super::AppState;
use crate::model::{AggregateRow, PlotHistoryRow, RecordId, StoredPlot, StoredZone};
use crate::scheduler::{metrics as sync_metrics, JobKind, JobStates, PassReport};
use crate::store::{self, plots, zones, Dump, LastWrites, ZoneFilter};
use crate::SyncError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub timestamp: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn status_for(error: &SyncError) -> StatusCode {
    match error {
        SyncError::Busy(_) => StatusCode::CONFLICT,
        SyncError::Transport(_) | SyncError::Schema(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, kind = error.kind(), "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: error.kind(),
            timestamp: now(),
        }),
    )
}

fn bad_request(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message,
            kind: "bad_request",
            timestamp: now(),
        }),
    )
}

// ============================================================================
// Reads
// ============================================================================

pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub(super) async fn metrics() -> ApiResult<impl IntoResponse> {
    let body = sync_metrics::encode_metrics().map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

pub(super) async fn active_plots(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<StoredPlot>>> {
    let rows = state
        .store
        .run(|conn| plots::list_plots(conn, false))
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

pub(super) async fn deleted_plots(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<StoredPlot>>> {
    let rows = state
        .store
        .run(|conn| plots::list_plots(conn, true))
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

pub(super) async fn plot_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PlotHistoryRow>>> {
    let id: RecordId = id
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("Invalid plot id: {}", id)))?;

    let rows = state
        .store
        .run(move |conn| plots::plot_history(conn, id))
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

pub(super) async fn aggregate_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AggregateRow>>> {
    let rows = state
        .store
        .run(|conn| plots::aggregate_history(conn))
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

async fn zones_matching(state: &AppState, filter: ZoneFilter) -> ApiResult<Json<Vec<StoredZone>>> {
    let rows = state
        .store
        .run(move |conn| zones::list_zones(conn, &filter))
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

pub(super) async fn all_zones(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<StoredZone>>> {
    zones_matching(&state, ZoneFilter::All).await
}

pub(super) async fn functioning_zones(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<StoredZone>>> {
    zones_matching(&state, ZoneFilter::Functioning).await
}

pub(super) async fn not_functioning_zones(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<StoredZone>>> {
    zones_matching(&state, ZoneFilter::NotFunctioning).await
}

pub(super) async fn zones_by_status(
    State(state): State<Arc<AppState>>,
    Path(status): Path<String>,
) -> ApiResult<Json<Vec<StoredZone>>> {
    zones_matching(&state, ZoneFilter::Status(status)).await
}

pub(super) async fn dump(State(state): State<Arc<AppState>>) -> ApiResult<Json<Dump>> {
    let dump = state.store.run(store::dump).await.map_err(api_error)?;
    Ok(Json(dump))
}

// ============================================================================
// Sync triggers
// ============================================================================

/// Response of a manual sync trigger
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job: JobKind,
    pub status: &'static str,
    pub timestamp: String,
    pub changes: usize,
    pub report: PassReport,
}

async fn trigger(state: &AppState, kind: JobKind) -> ApiResult<Json<TriggerResponse>> {
    let report = state.scheduler.trigger(kind).await.map_err(api_error)?;
    Ok(Json(TriggerResponse {
        job: kind,
        status: "ok",
        timestamp: now(),
        changes: report.change_count(),
        report,
    }))
}

pub(super) async fn update_plots(State(state): State<Arc<AppState>>) -> ApiResult<Json<TriggerResponse>> {
    trigger(&state, JobKind::Plots).await
}

pub(super) async fn update_zones(State(state): State<Arc<AppState>>) -> ApiResult<Json<TriggerResponse>> {
    trigger(&state, JobKind::Zones).await
}

/// Response of `/api/update-status`
#[derive(Debug, Serialize)]
pub struct UpdateStatus {
    pub last_updates: LastWrites,
    pub scheduler_active: bool,
    pub jobs: JobStates,
    pub current_time: String,
}

pub(super) async fn update_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<UpdateStatus>> {
    let last_updates = state
        .store
        .run(|conn| store::last_writes(conn))
        .await
        .map_err(api_error)?;

    Ok(Json(UpdateStatus {
        last_updates,
        scheduler_active: state.scheduler.is_active(),
        jobs: state.scheduler.states(),
        current_time: now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::ApiServer;
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::model::{PlotSnapshot, ZoneSnapshot};
    use crate::reconcile::{reconcile_plots, reconcile_zones};
    use crate::scheduler::Scheduler;
    use crate::store::{Store, StoreConfig};
    use crate::upstream::SnapshotSource;
    use crate::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PLOTS: &str = r#"{
        "sensores": {"humedad": 40, "temperatura": 25, "lluvia": 0, "sol": 1},
        "parcelas": [
            {"id": 1, "nombre": "Norte", "ultimo_riego": "2025-03-01 08:00:00", "latitud": 21.0,
             "longitud": -86.0, "sensor": {"humedad": 50, "temperatura": 24, "lluvia": 0, "sol": 70}},
            {"id": 2, "nombre": "Sur", "ultimo_riego": "2025-03-01 09:00:00", "latitud": 20.5,
             "longitud": -86.5, "sensor": {"humedad": 45, "temperatura": 26, "lluvia": 1, "sol": 80}}
        ]
    }"#;

    const ZONES: &str = r#"{"zonas": [
        {"id": 1, "nombre": "Riego 1", "estado": "activo"},
        {"id": 2, "nombre": "Riego 2", "estado": "Mantenimiento"},
        {"id": 3, "nombre": "Riego 3"}
    ]}"#;

    /// Upstream that is always down
    struct Unreachable;

    #[async_trait]
    impl SnapshotSource for Unreachable {
        async fn fetch_plots(&self) -> Result<PlotSnapshot> {
            Err(SyncError::Transport("connection refused".to_string()))
        }

        async fn fetch_zones(&self) -> Result<ZoneSnapshot> {
            Err(SyncError::Transport("connection refused".to_string()))
        }
    }

    fn create_test_server() -> (Arc<AppState>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp_dir.path().join("fieldsync.db"))).unwrap();

        let mut conn = store.connect().unwrap();
        reconcile_plots(&mut conn, &PlotSnapshot::from_json(PLOTS).unwrap()).unwrap();
        reconcile_zones(&mut conn, &ZoneSnapshot::from_json(ZONES).unwrap()).unwrap();

        let scheduler = Scheduler::from_source(Arc::new(Unreachable), store.clone(), &ScheduleConfig::default());
        let state = Arc::new(AppState { store, scheduler });
        (state, temp_dir)
    }

    async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        send(state, "GET", uri).await
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = ApiServer::router(state.clone());
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _temp) = create_test_server();
        let (status, body) = get_json(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_active_and_deleted_plots() {
        let (state, _temp) = create_test_server();
        state
            .store
            .run(|conn| plots::set_plot_deleted(conn, 2, true))
            .await
            .unwrap();

        let (status, active) = get_json(&state, "/api/parcelas").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(active.as_array().unwrap().len(), 1);
        assert_eq!(active[0]["id"], 1);
        assert_eq!(active[0]["nombre"], "Norte");

        let (_, deleted) = get_json(&state, "/api/parcelas/eliminadas").await;
        assert_eq!(deleted.as_array().unwrap().len(), 1);
        assert_eq!(deleted[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_plot_history() {
        let (state, _temp) = create_test_server();

        let (status, rows) = get_json(&state, "/api/historico/parcelas/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["parcela_id"], 1);

        let (status, body) = get_json(&state, "/api/historico/parcelas/norte").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("norte"));
    }

    #[tokio::test]
    async fn test_aggregate_history() {
        let (state, _temp) = create_test_server();
        let (status, rows) = get_json(&state, "/api/historico/globales").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zone_views() {
        let (state, _temp) = create_test_server();

        let (_, all) = get_json(&state, "/api/zonas-riego").await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (_, working) = get_json(&state, "/api/zonas-riego/funcionando").await;
        assert_eq!(working.as_array().unwrap().len(), 2);

        let (_, broken) = get_json(&state, "/api/zonas-riego/no-funcionando").await;
        assert_eq!(broken.as_array().unwrap().len(), 1);
        assert_eq!(broken[0]["id"], 2);

        let (status, by_status) = get_json(&state, "/api/zonas-riego/estado/ACTIVO").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_status.as_array().unwrap().len(), 1);
        assert_eq!(by_status[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_dump() {
        let (state, _temp) = create_test_server();
        let (status, body) = get_json(&state, "/api/dump").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["parcelas"].as_array().unwrap().len(), 2);
        assert_eq!(body["historico"].as_array().unwrap().len(), 2);
        assert_eq!(body["globales"].as_array().unwrap().len(), 1);
        assert_eq!(body["zonas"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_trigger_maps_transport_failure_to_bad_gateway() {
        let (state, _temp) = create_test_server();

        let (status, body) = send(&state, "POST", "/api/update-data").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "transport_error");

        let (status, _) = get_json(&state, "/api/update-zonas").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_update_status() {
        let (state, _temp) = create_test_server();
        let (status, body) = get_json(&state, "/api/update-status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scheduler_active"], false);
        assert_eq!(body["jobs"]["plot-sync"], "idle");
        assert!(body["last_updates"]["parcelas"].is_string());
        assert!(body["last_updates"]["zonas_riego"].is_string());
        assert!(body["current_time"].is_string());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&SyncError::Busy(JobKind::Plots)), StatusCode::CONFLICT);
        assert_eq!(status_for(&SyncError::Schema("x".to_string())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&SyncError::Store {
                statement: "COMMIT".to_string(),
                source: rusqlite::Error::InvalidQuery,
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _temp) = create_test_server();
        sync_metrics::record_pass("plot-sync", "success", 0.1);

        let app = ApiServer::router(state);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("fieldsync_passes_total"));
    }
}
