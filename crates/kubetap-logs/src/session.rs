use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipe::{LogPipe, PipeEvent, StreamOutcome};
use crate::source::{LineLimits, LineSource};

/// Count of live streaming sessions, shared with the health endpoint
#[derive(Clone, Debug, Default)]
pub struct ActiveStreams {
    count: Arc<AtomicUsize>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            count: Arc::clone(&self.count),
        }
    }
}

struct ActiveGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One backend log stream bound to one client connection.
///
/// The session owns the relay for its whole life. However it ends (clean
/// end, read failure, client gone, cancellation) dropping it releases the
/// backend stream exactly once and logs the outcome once.
pub struct StreamSession {
    pipe: LogPipe,
    target: String,
    started_at: DateTime<Utc>,
    _active: ActiveGuard,
}

impl StreamSession {
    /// Start relaying `reader` for `target` (`namespace/pod/container`)
    pub fn start<R>(
        target: impl Into<String>,
        reader: R,
        limits: LineLimits,
        cancel: CancellationToken,
        active: &ActiveStreams,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let target = target.into();
        debug!(stream = %target, "Starting log stream session");

        Self {
            pipe: LogPipe::spawn(LineSource::with_limits(reader, limits), cancel),
            target,
            started_at: Utc::now(),
            _active: active.enter(),
        }
    }

    /// Next event for the client, `None` once the session is over
    pub async fn next_event(&mut self) -> Option<PipeEvent> {
        self.pipe.next().await
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.pipe.outcome()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // A session dropped before reaching a terminal state lost its client
        let outcome = self.pipe.outcome().unwrap_or(StreamOutcome::ClientGone);
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        let lines = self.pipe.delivered();

        match outcome {
            StreamOutcome::ReadFailed => {
                let error = self
                    .pipe
                    .read_error()
                    .map_or_else(|| "producer task failed".to_string(), ToString::to_string);
                warn!(
                    stream = %self.target,
                    lines,
                    elapsed_ms,
                    error = %error,
                    "Log stream read failed"
                );
            }
            StreamOutcome::Completed => {
                info!(stream = %self.target, lines, elapsed_ms, "Log stream ended");
            }
            StreamOutcome::ClientGone | StreamOutcome::Cancelled => {
                info!(
                    stream = %self.target,
                    lines,
                    elapsed_ms,
                    outcome = outcome.as_str(),
                    "Log stream closed"
                );
            }
        }
    }
}
