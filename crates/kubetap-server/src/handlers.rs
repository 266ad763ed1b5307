//! HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use kubetap_k8s::LogBackend;
use kubetap_logs::StreamSession;

use crate::error::{ApiError, ApiResult};
use crate::resolve::{LogQuery, resolve_request};
use crate::sse::{event_stream, sse_response};
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_streams: usize,
    pub timestamp: DateTime<Utc>,
}

/// Handle GET /healthz
pub async fn health_check<B: LogBackend>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<HealthResponse> {
    let status = if state.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        active_streams: state.active_streams().get(),
        timestamp: Utc::now(),
    })
}

/// Handle GET /api/v1/namespaces/{namespace}/pods/{name}/logs
///
/// Tails one container's log as an event stream. All validation happens
/// before the backend stream is opened; after that the status is 200 and the
/// outcome shows only in whether the `end` frame arrives.
pub async fn pod_logs<B: LogBackend>(
    State(state): State<Arc<AppState<B>>>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Response> {
    let request = resolve_request(state.backend(), state.config(), &namespace, &name, &query)
        .await
        .inspect_err(|e| warn!(namespace = %namespace, pod = %name, error = %e, "Rejected log request"))?;

    let stream = state
        .backend()
        .open_log_stream(&request)
        .await
        .map_err(ApiError::stream_open)
        .inspect_err(|e| warn!(stream = %request.target(), error = %e, "Failed to open log stream"))?;

    info!(
        namespace = %request.namespace,
        pod = %request.pod_name,
        container = %request.options.container,
        cluster = request.cluster.as_deref().unwrap_or("default"),
        tail_lines = request.options.tail_lines,
        "Streaming container logs"
    );

    let session = StreamSession::start(
        request.target(),
        stream,
        state.config().line_limits(),
        state.session_token(),
        state.active_streams(),
    );

    Ok(sse_response(event_stream(
        session,
        state.config().keep_alive(),
    )))
}
