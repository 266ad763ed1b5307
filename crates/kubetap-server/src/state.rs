//! Shared state for the log server.

use tokio_util::sync::CancellationToken;

use kubetap_k8s::LogBackend;
use kubetap_logs::ActiveStreams;

use crate::config::ServerConfig;

/// State shared by every request handler.
#[derive(Debug)]
pub struct AppState<B> {
    backend: B,
    config: ServerConfig,
    active: ActiveStreams,
    /// Parent of every session's cancellation token.
    shutdown: CancellationToken,
}

impl<B: LogBackend> AppState<B> {
    pub fn new(config: ServerConfig, backend: B) -> Self {
        Self {
            backend,
            config,
            active: ActiveStreams::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live streaming sessions.
    pub fn active_streams(&self) -> &ActiveStreams {
        &self.active
    }

    /// Token for a new session; cancelled along with the server.
    pub fn session_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancel every live session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
