use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::io::AsyncRead;

use kubetap_types::{LogRequest, PodInfo};

/// An open container log stream.
///
/// Dropping the stream closes it; the relay relies on that to release the
/// backend connection on every exit path.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Failures reported by a [`LogBackend`]
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("pod '{pod}' not found in namespace '{namespace}'")]
    PodNotFound { namespace: String, pod: String },

    #[error("{0}")]
    Upstream(String),
}

impl BackendError {
    /// Whether the error means the addressed object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ClusterNotFound(_) | Self::PodNotFound { .. })
    }

    /// Classify a kube error for a pod-scoped call
    pub fn from_kube(err: kube::Error, namespace: &str, pod: &str) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => Self::PodNotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            },
            _ => Self::Upstream(err.to_string()),
        }
    }
}

/// Source of pod metadata and container log streams
pub trait LogBackend: Send + Sync + 'static {
    /// Fetch a pod, including its container and init container names
    fn get_pod(
        &self,
        cluster: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<PodInfo, BackendError>> + Send;

    /// Open the log stream described by `request`, positioned at the tail
    fn open_log_stream(
        &self,
        request: &LogRequest,
    ) -> impl Future<Output = Result<LogStream, BackendError>> + Send;
}
