//! Kubernetes client for kubetap

use std::collections::HashMap;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::{Container, Pod};
use kube::api::LogParams;
use kube::client::Body;
use kube::{Api, Resource};
use parking_lot::RwLock;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::backend::{BackendError, LogBackend, LogStream};
use kubetap_types::{ContainerInfo, LogRequest, PodInfo};

/// Context name used when running inside a cluster without a kubeconfig
const IN_CLUSTER: &str = "in-cluster";

/// Kubernetes backend with one lazily created client per kubeconfig context
pub struct KubeBackend {
    /// Loaded kubeconfig, `None` when using the in-cluster service account
    kubeconfig: Option<Kubeconfig>,

    /// Context used when a request does not name one
    default_context: Option<String>,

    /// Clients already built, keyed by context name
    clients: RwLock<HashMap<String, kube::Client>>,
}

impl KubeBackend {
    /// Load the kubeconfig, falling back to the in-cluster configuration
    pub fn new(default_context: Option<String>) -> Result<Self> {
        match Kubeconfig::read() {
            Ok(kubeconfig) => Ok(Self::from_kubeconfig(kubeconfig, default_context)),
            Err(err) => {
                info!(error = %err, "No kubeconfig found, using in-cluster configuration");
                if default_context.as_deref().is_some_and(|c| c != IN_CLUSTER) {
                    anyhow::bail!(
                        "Context '{}' requested but no kubeconfig could be read",
                        default_context.unwrap_or_default()
                    );
                }
                Ok(Self {
                    kubeconfig: None,
                    default_context: Some(IN_CLUSTER.to_string()),
                    clients: RwLock::new(HashMap::new()),
                })
            }
        }
    }

    /// Build a backend from an already parsed kubeconfig
    pub fn from_kubeconfig(kubeconfig: Kubeconfig, default_context: Option<String>) -> Self {
        let default_context = default_context.or_else(|| kubeconfig.current_context.clone());
        Self {
            kubeconfig: Some(kubeconfig),
            default_context,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Names of all contexts this backend can serve
    pub fn contexts(&self) -> Vec<String> {
        match &self.kubeconfig {
            Some(kubeconfig) => kubeconfig.contexts.iter().map(|c| c.name.clone()).collect(),
            None => vec![IN_CLUSTER.to_string()],
        }
    }

    /// Context used when a request does not name one
    pub fn default_context(&self) -> Option<&str> {
        self.default_context.as_deref()
    }

    /// Map the requested cluster onto a known context name
    fn resolve_context(&self, cluster: Option<&str>) -> Result<String, BackendError> {
        let requested = cluster.filter(|c| !c.is_empty());
        let Some(name) = requested.or(self.default_context.as_deref()) else {
            return Err(BackendError::ClusterNotFound(String::new()));
        };

        if self.contexts().iter().any(|c| c == name) {
            Ok(name.to_string())
        } else {
            Err(BackendError::ClusterNotFound(name.to_string()))
        }
    }

    /// Get (or create and cache) the client for a cluster
    pub async fn client_for(&self, cluster: Option<&str>) -> Result<kube::Client, BackendError> {
        let context_name = self.resolve_context(cluster)?;

        let cached = self.clients.read().get(&context_name).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        let client = self
            .build_client(&context_name)
            .await
            .map_err(|e| BackendError::Upstream(format!("{e:#}")))?;

        debug!(context = %context_name, "Created cluster client");
        let mut clients = self.clients.write();
        Ok(clients.entry(context_name).or_insert(client).clone())
    }

    /// Create a kube::Client for a specific context
    async fn build_client(&self, context_name: &str) -> Result<kube::Client> {
        let config = match &self.kubeconfig {
            Some(kubeconfig) => kube::Config::from_custom_kubeconfig(
                kubeconfig.clone(),
                &KubeConfigOptions {
                    context: Some(context_name.to_string()),
                    ..Default::default()
                },
            )
            .await
            .context(format!(
                "Failed to create config for context: {}",
                context_name
            ))?,
            None => kube::Config::incluster().context("Failed to load in-cluster config")?,
        };

        kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context_name
        ))
    }
}

impl LogBackend for KubeBackend {
    async fn get_pod(
        &self,
        cluster: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Result<PodInfo, BackendError> {
        let client = self.client_for(cluster).await?;
        let pods: Api<Pod> = Api::namespaced(client, namespace);
        let pod = pods
            .get(name)
            .await
            .map_err(|e| BackendError::from_kube(e, namespace, name))?;

        Ok(pod_to_info(pod, namespace))
    }

    async fn open_log_stream(&self, request: &LogRequest) -> Result<LogStream, BackendError> {
        let client = self.client_for(request.cluster.as_deref()).await?;
        let (namespace, pod) = (request.namespace.as_str(), request.pod_name.as_str());

        let opts = &request.options;
        let params = LogParams {
            container: Some(opts.container.clone()),
            follow: opts.follow,
            previous: opts.previous,
            timestamps: opts.timestamps,
            tail_lines: Some(opts.tail_lines),
            since_seconds: opts.since_seconds,
            ..Default::default()
        };

        // Built by hand rather than via Api::log_stream so the body stream is
        // owned and can move into the relay task.
        let http_request = kube::core::Request::new(Pod::url_path(&(), Some(namespace)))
            .logs(pod, &params)
            .map_err(|e| BackendError::Upstream(e.to_string()))?;

        let response = client
            .send(http_request.map(Body::from))
            .await
            .map_err(|e| BackendError::from_kube(e, namespace, pod))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 404 {
                return Err(BackendError::PodNotFound {
                    namespace: namespace.to_string(),
                    pod: pod.to_string(),
                });
            }
            let body = response
                .into_body()
                .collect()
                .await
                .map(|b| b.to_bytes())
                .unwrap_or_default();
            return Err(BackendError::Upstream(format!(
                "log request failed with status {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            )));
        }

        let data = response
            .into_body()
            .into_data_stream()
            .map_err(std::io::Error::other);

        Ok(Box::pin(StreamReader::new(data)))
    }
}

/// Convert a k8s Pod to PodInfo
fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
    let name = pod.metadata.name.unwrap_or_default();
    let mut info = PodInfo::new(name, namespace.to_string());

    if let Some(spec) = pod.spec {
        info.containers = spec.containers.into_iter().map(container_info).collect();
        info.init_containers = spec
            .init_containers
            .unwrap_or_default()
            .into_iter()
            .map(container_info)
            .collect();
    }

    info
}

fn container_info(container: Container) -> ContainerInfo {
    let mut info = ContainerInfo::new(container.name);
    info.image = container.image;
    info
}
