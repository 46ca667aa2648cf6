//! REST rendition of the storage catalog
//!
//! Same booleans and not-found semantics as the bus protocol; only the
//! encoding differs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::state::GatewayState;
use crate::coordinator::{FileRecord, StorageSnapshot};
use crate::error::PoolError;
use crate::metrics::MetricsSnapshot;

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

fn error_response(err: PoolError) -> (StatusCode, String) {
    let status = match err {
        PoolError::UnknownCleaner(_) | PoolError::NotFound(_) => StatusCode::NOT_FOUND,
        PoolError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub storage: StorageSnapshot,
    pub metrics: MetricsSnapshot,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterCleanerBody {
    pub cleaner_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdleBody {
    pub idle: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub registered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleaningModeResponse {
    pub cleaning_mode: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileCountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadBody {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub admitted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveOldestBody {
    pub cleaner_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveOldestResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CapacityBody {
    pub capacity: u64,
}

/// Liveness probe
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn status(State(state): State<GatewayState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        storage: state.coordinator.snapshot().await,
        metrics: state.metrics.snapshot(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<GatewayState>) -> impl IntoResponse {
    let storage = state.coordinator.snapshot().await;
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.prometheus(&storage),
    )
}

pub async fn register_cleaner(
    State(state): State<GatewayState>,
    Json(body): Json<RegisterCleanerBody>,
) -> ApiResult<RegisteredResponse> {
    if body.cleaner_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "cleaner_id is required".to_string()));
    }
    let registered = state.coordinator.register_cleaner(&body.cleaner_id).await;
    Ok(Json(RegisteredResponse { registered }))
}

pub async fn get_cleaner_idle(
    State(state): State<GatewayState>,
    Path(cleaner_id): Path<String>,
) -> ApiResult<IdleBody> {
    let idle = state
        .coordinator
        .get_cleaner_idle(&cleaner_id)
        .await
        .map_err(error_response)?;
    Ok(Json(IdleBody { idle }))
}

pub async fn set_cleaner_idle(
    State(state): State<GatewayState>,
    Path(cleaner_id): Path<String>,
    Json(body): Json<IdleBody>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    state
        .coordinator
        .set_cleaner_idle(&cleaner_id, body.idle)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cleaning_mode(State(state): State<GatewayState>) -> Json<CleaningModeResponse> {
    Json(CleaningModeResponse {
        cleaning_mode: state.coordinator.is_cleaning_mode().await,
    })
}

pub async fn file_count(State(state): State<GatewayState>) -> Json<FileCountResponse> {
    Json(FileCountResponse {
        count: state.coordinator.get_file_count().await,
    })
}

pub async fn upload_file(
    State(state): State<GatewayState>,
    Json(body): Json<UploadBody>,
) -> Json<UploadResponse> {
    let admitted = state.coordinator.try_send_file(&body.name, body.size).await;
    state.metrics.record_upload(admitted);
    Json(UploadResponse { admitted })
}

pub async fn take_file(
    State(state): State<GatewayState>,
    Path(index): Path<i64>,
) -> ApiResult<FileRecord> {
    let taken = match usize::try_from(index) {
        Ok(position) => state.coordinator.try_get_file(position).await,
        Err(_) => None,
    };
    state.metrics.record_download(taken.is_some());
    taken
        .map(Json)
        .ok_or_else(|| error_response(PoolError::NotFound(format!("file at index {index}"))))
}

pub async fn remove_oldest(
    State(state): State<GatewayState>,
    Json(body): Json<RemoveOldestBody>,
) -> Json<RemoveOldestResponse> {
    let removed = state.coordinator.try_remove_oldest_file(&body.cleaner_id).await;
    state.metrics.record_cleanup(removed);
    Json(RemoveOldestResponse { removed })
}

pub async fn set_capacity(
    State(state): State<GatewayState>,
    Json(body): Json<CapacityBody>,
) -> ApiResult<StorageSnapshot> {
    if body.capacity == 0 {
        return Err(error_response(PoolError::Validation(
            "capacity must be positive".to_string(),
        )));
    }
    state.coordinator.set_capacity(body.capacity).await;
    info!(capacity = body.capacity, "capacity changed via admin endpoint");
    Ok(Json(state.coordinator.snapshot().await))
}
