//! Shared types for kubetap
//!
//! This crate contains data structures used across multiple kubetap crates.

use std::sync::LazyLock;

use regex::Regex;

/// Tail length used when a request does not carry a usable `tailLines`
pub const DEFAULT_TAIL_LINES: i64 = 100;

/// Initial capacity of the line read buffer
pub const INITIAL_LINE_BUFFER: usize = 4 * 1024;

/// Longest single log line accepted before the stream is failed
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Pod information, reduced to what log streaming needs
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerInfo>,
    pub init_containers: Vec<ContainerInfo>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            containers: Vec::new(),
            init_containers: Vec::new(),
        }
    }

    /// Add a regular container (builder style, mostly for tests)
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.containers.push(ContainerInfo::new(name.into()));
        self
    }

    /// Add an init container (builder style, mostly for tests)
    pub fn with_init_container(mut self, name: impl Into<String>) -> Self {
        self.init_containers.push(ContainerInfo::new(name.into()));
        self
    }

    /// Container or init container called exactly `name`
    pub fn find_container(&self, name: &str) -> Option<&ContainerInfo> {
        self.containers
            .iter()
            .chain(self.init_containers.iter())
            .find(|c| c.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub name: String,
    pub image: Option<String>,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self { name, image: None }
    }
}

// ============================================================================
// Log Request Types
// ============================================================================

/// Options handed to the backend when opening a log stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read from
    pub container: String,

    /// Prefix each line with the runtime timestamp
    pub timestamps: bool,

    /// Number of most recent lines to start from
    pub tail_lines: i64,

    /// Keep the stream open for new output
    pub follow: bool,

    /// Read the previous (terminated) container instance
    pub previous: bool,

    /// Only return output newer than this many seconds
    pub since_seconds: Option<i64>,
}

impl LogOptions {
    /// Options for live tailing of `container` with default tail length
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            timestamps: false,
            tail_lines: DEFAULT_TAIL_LINES,
            follow: true,
            previous: false,
            since_seconds: None,
        }
    }
}

/// A validated request to tail one container of one pod
#[derive(Clone, Debug)]
pub struct LogRequest {
    /// Cluster (kubeconfig context) to use; `None` selects the default
    pub cluster: Option<String>,
    pub namespace: String,
    pub pod_name: String,
    pub options: LogOptions,
}

impl LogRequest {
    /// `namespace/pod/container`, used in log fields
    pub fn target(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace, self.pod_name, self.options.container
        )
    }
}

// ============================================================================
// Parameter Parsing
// ============================================================================

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern compiles")
});

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS subdomain pattern compiles")
});

/// Namespaces are DNS-1123 labels (at most 63 chars)
pub fn is_valid_namespace(namespace: &str) -> bool {
    namespace.len() <= 63 && DNS_LABEL.is_match(namespace)
}

/// Pod names are DNS-1123 subdomains (at most 253 chars)
pub fn is_valid_resource_name(name: &str) -> bool {
    name.len() <= 253 && DNS_SUBDOMAIN.is_match(name)
}

/// Parse a strictly positive integer, ignoring anything else
pub fn parse_positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
}

/// Parse `tailLines`; absent, unparseable or non-positive input yields `default`
pub fn parse_tail_lines(raw: Option<&str>, default: i64) -> i64 {
    parse_positive(raw).unwrap_or(default)
}

/// Boolean query flag. Only the exact strings `true` / `false` flip it.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some("true") => true,
        Some("false") => false,
        _ => default,
    }
}
