//! Error types for the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use kubetap_k8s::BackendError;

/// Result type alias for request handling.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised before a log stream starts.
///
/// Once the event stream has begun, failures can no longer change the
/// response status and are reported through stream termination instead.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed identifier or missing required parameter.
    #[error("{0}")]
    InvalidArgument(String),

    /// Cluster, pod or container does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Backend failure not classified as not-found.
    #[error("{0}")]
    Upstream(String),

    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Server loop failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Classify a failure to fetch the target pod
    pub fn pod_lookup(err: BackendError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Upstream(format!("failed to get pod: {err}"))
        }
    }

    /// Classify a failure to open the backend log stream
    pub fn stream_open(err: BackendError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Upstream(format!("failed to open log stream: {err}"))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::BindFailed(_, _) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
