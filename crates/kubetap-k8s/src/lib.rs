//! Kubernetes backend for kubetap
//!
//! This crate provides the log-stream capability the relay depends on: looking
//! up a pod's containers and opening a container's log stream, per cluster.

mod backend;
mod client;

pub use backend::{BackendError, LogBackend, LogStream};
pub use client::KubeBackend;

// Re-export types that are used in our public API
pub use kubetap_types::{ContainerInfo, LogOptions, LogRequest, PodInfo};
