//! Route configuration for the log API.

use std::sync::Arc;

use axum::Router;
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use kubetap_k8s::LogBackend;

use crate::config::ServerConfig;
use crate::handlers::{health_check, pod_logs};
use crate::state::AppState;

/// Create the API router.
pub fn create_router<B: LogBackend>(state: Arc<AppState<B>>) -> Router {
    let cors = build_cors_layer(state.config());

    let api_routes = Router::new()
        .route("/namespaces/{namespace}/pods/{name}/logs", get(pod_logs::<B>));

    Router::new()
        .route("/healthz", get(health_check::<B>))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
///
/// Credentials are allowed, which rules out a literal `*`; with no
/// configured origins the request's own origin is echoed back instead.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = if config.cors_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            CONTENT_LENGTH,
            ACCEPT_ENCODING,
            AUTHORIZATION,
            ACCEPT,
            ORIGIN,
            CACHE_CONTROL,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
        ])
}
