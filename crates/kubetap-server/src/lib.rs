//! HTTP front end for kubetap
//!
//! Serves container logs to browsers as Server-Sent Events. Each request is
//! validated and resolved against the backend before a log stream is opened;
//! the stream is then relayed line by line until it ends, fails, the client
//! leaves, or the server shuts down.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/healthz` | GET | Liveness and active stream count |
//! | `/api/v1/namespaces/{namespace}/pods/{name}/logs` | GET | Stream container logs (SSE) |

pub mod config;
pub mod error;
pub mod handlers;
pub mod resolve;
pub mod routes;
pub mod server;
pub mod sse;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use server::LogServer;
pub use state::AppState;
