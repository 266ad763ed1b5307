//! Request validation and resolution for the pod log endpoint.

use serde::Deserialize;
use tracing::debug;

use kubetap_k8s::LogBackend;
use kubetap_types::{
    LogOptions, LogRequest, is_valid_namespace, is_valid_resource_name, parse_flag,
    parse_positive, parse_tail_lines,
};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};

/// Raw query parameters of the pod log endpoint.
///
/// Everything is kept as text so a malformed optional value falls back to its
/// default instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub container: Option<String>,
    pub timestamps: Option<String>,
    #[serde(rename = "tailLines")]
    pub tail_lines: Option<String>,
    pub follow: Option<String>,
    pub previous: Option<String>,
    #[serde(rename = "sinceSeconds")]
    pub since_seconds: Option<String>,
    /// Kubeconfig context to use
    pub cluster: Option<String>,
}

impl LogQuery {
    /// Log options for `container`, defaulting anything missing or unusable
    pub fn log_options(&self, container: &str, default_tail_lines: i64) -> LogOptions {
        LogOptions {
            container: container.to_string(),
            timestamps: parse_flag(self.timestamps.as_deref(), false),
            tail_lines: parse_tail_lines(self.tail_lines.as_deref(), default_tail_lines),
            follow: parse_flag(self.follow.as_deref(), true),
            previous: parse_flag(self.previous.as_deref(), false),
            since_seconds: parse_positive(self.since_seconds.as_deref()),
        }
    }
}

/// Validate a log request and confirm its container exists.
///
/// Every failure here happens before a backend stream is opened. The only
/// backend call is the read-only pod fetch, made after the parameters check out.
pub async fn resolve_request<B: LogBackend>(
    backend: &B,
    config: &ServerConfig,
    namespace: &str,
    name: &str,
    query: &LogQuery,
) -> ApiResult<LogRequest> {
    let namespace = namespace.trim();
    let name = name.trim();

    if !is_valid_namespace(namespace) || !is_valid_resource_name(name) {
        return Err(ApiError::InvalidArgument(
            "invalid namespace or pod name format".to_string(),
        ));
    }

    let container = match query.container.as_deref() {
        Some(container) if !container.is_empty() => container,
        _ => {
            return Err(ApiError::InvalidArgument(
                "the 'container' query parameter is required".to_string(),
            ));
        }
    };

    let cluster = query.cluster.as_deref().filter(|c| !c.is_empty());
    let pod = backend
        .get_pod(cluster, namespace, name)
        .await
        .map_err(ApiError::pod_lookup)?;

    let Some(found) = pod.find_container(container) else {
        return Err(ApiError::NotFound(format!(
            "container '{container}' not found in pod '{name}'"
        )));
    };

    let options = query.log_options(container, config.default_tail_lines);
    debug!(
        namespace,
        pod = name,
        container,
        image = found.image.as_deref().unwrap_or("unknown"),
        tail_lines = options.tail_lines,
        follow = options.follow,
        "Resolved log request"
    );

    Ok(LogRequest {
        cluster: cluster.map(str::to_string),
        namespace: namespace.to_string(),
        pod_name: name.to_string(),
        options,
    })
}
