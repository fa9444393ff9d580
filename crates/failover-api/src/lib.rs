//! Control API (C7): the operator surface over the failover coordinator.
//!
//! Thin axum layer. Every internal result value from `failover-core` is
//! converted to an HTTP status at the handler boundary only — nothing
//! upstream of this crate knows about `StatusCode`.

#![warn(missing_docs)]

pub mod state;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use failover_core::{CoordinatorRejection, FailoverErrorKind, FailoverRecord, MetricsSnapshot};

pub use state::ApiState;

/// Builds the router with all C7 routes mounted against `state`.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/failover/:target_region", post(trigger_failover))
        .route("/status", get(status))
        .route("/history", get(history))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A JSON error body plus the status it's served with. Internal result
/// values are converted into this only here, at the transport boundary.
struct ApiError {
    status: StatusCode,
    kind: FailoverErrorKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.kind }))).into_response()
    }
}

impl From<CoordinatorRejection> for ApiError {
    fn from(rejection: CoordinatorRejection) -> Self {
        let status = match rejection {
            CoordinatorRejection::AlreadyInProgress | CoordinatorRejection::AlreadyAtTarget => StatusCode::CONFLICT,
            CoordinatorRejection::UnknownRegion => StatusCode::BAD_REQUEST,
        };
        Self { status, kind: rejection.kind() }
    }
}

async fn trigger_failover(
    State(state): State<Arc<ApiState>>,
    Path(target_region): Path<String>,
) -> Result<Json<FailoverRecord>, ApiError> {
    let record = state.coordinator.trigger(&target_region).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
struct StatusResponse {
    active_region: String,
    version: u64,
    in_flight: bool,
    last_attempt: Option<FailoverRecord>,
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let snapshot = state.registry.read();
    Json(StatusResponse {
        active_region: snapshot.active_region,
        version: snapshot.version,
        in_flight: state.coordinator.is_in_flight(),
        last_attempt: state.history.last(),
    })
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    count: usize,
    records: Vec<FailoverRecord>,
}

async fn history(State(state): State<Arc<ApiState>>, Query(params): Query<HistoryParams>) -> Json<HistoryResponse> {
    let records = state.history.recent(params.limit.unwrap_or(100));
    Json(HistoryResponse {
        count: records.len(),
        records,
    })
}

async fn metrics(State(state): State<Arc<ApiState>>) -> Json<MetricsSnapshot> {
    Json(state.history.summary())
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HealthResponse {
    Ok,
    Degraded { detail: String },
}

async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.check_reachability().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::Ok)),
        Err(detail) => (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::Degraded { detail })),
    }
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}
