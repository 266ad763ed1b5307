//! Log server implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use kubetap_k8s::LogBackend;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::routes::create_router;
use crate::state::AppState;

/// HTTP server relaying container logs to event-stream clients.
#[derive(Debug)]
pub struct LogServer<B> {
    state: Arc<AppState<B>>,
}

impl<B: LogBackend> LogServer<B> {
    /// Create a new log server with the given configuration and backend.
    #[must_use]
    pub fn new(config: ServerConfig, backend: B) -> Self {
        Self {
            state: Arc::new(AppState::new(config, backend)),
        }
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<AppState<B>> {
        Arc::clone(&self.state)
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }

    /// Serve on the configured address until `shutdown` completes.
    ///
    /// When `shutdown` resolves every live log stream is cancelled (no `end`
    /// frame is sent), then in-flight requests are drained.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> ApiResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::BindFailed(addr, e))?;

        let local = listener.local_addr().unwrap_or(addr);
        info!(addr = %local, "Log server listening");

        let state = self.state();
        let signal = async move {
            shutdown.await;
            info!(
                active_streams = state.active_streams().get(),
                "Shutting down, closing log streams"
            );
            state.shutdown();
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        info!("Log server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use crate::testing::FakeBackend;

    fn local_config() -> ServerConfig {
        ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    #[test]
    fn test_server_creation() {
        let server = LogServer::new(local_config(), FakeBackend::with_web_pod());

        assert_eq!(server.state().active_streams().get(), 0);
        assert!(!server.state().is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_sessions() {
        let server = LogServer::new(local_config(), FakeBackend::with_web_pod());
        let session_token = server.state().session_token();

        server.serve_with_shutdown(async {}).await.unwrap();

        assert!(server.state().is_shutting_down());
        assert!(session_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let server = LogServer::new(ServerConfig::new(addr), FakeBackend::with_web_pod());
        let err = server.serve_with_shutdown(async {}).await.unwrap_err();

        assert!(matches!(err, ApiError::BindFailed(a, _) if a == addr));
    }
}
