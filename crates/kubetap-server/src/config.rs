//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use kubetap_logs::LineLimits;
use kubetap_types::{DEFAULT_TAIL_LINES, INITIAL_LINE_BUFFER, MAX_LINE_BYTES};

/// Problems with a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the log streaming server.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Kubeconfig context used when a request has no `cluster` parameter.
    pub default_context: Option<String>,
    /// Tail length used when `tailLines` is missing or unusable.
    pub default_tail_lines: i64,
    /// Initial capacity of each stream's line buffer.
    pub initial_line_buffer: usize,
    /// Longest log line accepted before the stream is failed.
    pub max_line_bytes: usize,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// Interval for SSE keep-alive comments; disabled when unset.
    pub keep_alive_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            default_context: None,
            default_tail_lines: DEFAULT_TAIL_LINES,
            initial_line_buffer: INITIAL_LINE_BUFFER,
            max_line_bytes: MAX_LINE_BYTES,
            cors_origins: Vec::new(),
            keep_alive_secs: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_tail_lines <= 0 {
            return Err(ConfigError::Invalid(format!(
                "default_tail_lines must be positive, got {}",
                self.default_tail_lines
            )));
        }
        if self.initial_line_buffer == 0 || self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid(
                "line buffer sizes must be non-zero".to_string(),
            ));
        }
        if self.initial_line_buffer > self.max_line_bytes {
            return Err(ConfigError::Invalid(format!(
                "initial_line_buffer ({}) exceeds max_line_bytes ({})",
                self.initial_line_buffer, self.max_line_bytes
            )));
        }
        Ok(())
    }

    /// Set the default kubeconfig context.
    #[must_use]
    pub fn with_default_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = Some(context.into());
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Set the line buffer sizes.
    #[must_use]
    pub const fn with_line_limits(mut self, initial: usize, max: usize) -> Self {
        self.initial_line_buffer = initial;
        self.max_line_bytes = max;
        self
    }

    /// Enable SSE keep-alive comments.
    #[must_use]
    pub const fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_secs = Some(interval.as_secs());
        self
    }

    pub fn line_limits(&self) -> LineLimits {
        LineLimits {
            initial: self.initial_line_buffer,
            max: self.max_line_bytes,
        }
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
