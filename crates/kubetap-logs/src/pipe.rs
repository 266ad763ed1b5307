//! Cancellable single-producer / single-consumer line relay.
//!
//! One background task reads lines from a [`LineSource`] and hands them over a
//! capacity-1 channel. The consumer races three conditions: a line (or the
//! line channel closing), a read error, and cancellation. Whichever wins
//! decides how the session ends.

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{trace, warn};

use crate::source::{LineError, LineSource};

/// What the consumer should emit next
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipeEvent {
    /// One log line, in backend order
    Line(String),

    /// The backend stream ended cleanly; nothing follows
    End,
}

/// How a relay session terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Backend stream ended and the end marker was handed out
    Completed,

    /// Reading the backend stream failed after streaming began
    ReadFailed,

    /// The client went away (response dropped or a write failed)
    ClientGone,

    /// The session was cancelled from outside (e.g. server shutdown)
    Cancelled,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ReadFailed => "read_failed",
            Self::ClientGone => "client_gone",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Consumer side of a running relay.
///
/// Dropping it cancels the producer, which in turn drops (closes) the
/// backend stream.
pub struct LogPipe {
    lines: mpsc::Receiver<String>,
    errors: mpsc::Receiver<LineError>,
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    outcome: Option<StreamOutcome>,
    read_error: Option<LineError>,
    delivered: u64,
    _guard: DropGuard,
}

impl LogPipe {
    /// Start the producer task for `source`, bound to `cancel`
    pub fn spawn<R>(source: LineSource<R>, cancel: CancellationToken) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (line_tx, lines) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);
        let producer = tokio::spawn(produce(source, line_tx, error_tx, cancel.clone()));

        Self {
            lines,
            errors,
            _guard: cancel.clone().drop_guard(),
            cancel,
            producer,
            outcome: None,
            read_error: None,
            delivered: 0,
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the pipe has terminated; [`Self::outcome`] then
    /// says why. After [`PipeEvent::End`] the next call also returns `None`.
    pub async fn next(&mut self) -> Option<PipeEvent> {
        if self.outcome.is_some() {
            return None;
        }

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                self.outcome = Some(StreamOutcome::Cancelled);
                None
            }

            line = self.lines.recv() => match line {
                Some(line) => {
                    self.delivered += 1;
                    Some(PipeEvent::Line(line))
                }
                // The producer posts its error before dropping the line sender
                None => match self.errors.try_recv() {
                    Ok(err) => {
                        self.fail(err);
                        None
                    }
                    Err(_) => self.finish().await,
                },
            },

            Some(err) = self.errors.recv() => {
                self.fail(err);
                None
            }
        }
    }

    /// Line channel closed without an error: a clean end, unless the
    /// producer died
    async fn finish(&mut self) -> Option<PipeEvent> {
        match (&mut self.producer).await {
            Ok(()) => {
                self.outcome = Some(StreamOutcome::Completed);
                Some(PipeEvent::End)
            }
            Err(err) => {
                warn!(error = %err, "Log producer task failed");
                self.outcome = Some(StreamOutcome::ReadFailed);
                None
            }
        }
    }

    fn fail(&mut self, err: LineError) {
        self.read_error = Some(err);
        self.outcome = Some(StreamOutcome::ReadFailed);
    }

    /// Terminal state, if reached
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    /// The read failure behind [`StreamOutcome::ReadFailed`]
    pub fn read_error(&self) -> Option<&LineError> {
        self.read_error.as_ref()
    }

    /// Lines handed to the consumer so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

/// Producer loop. Owns the source, and with it the backend stream, until it
/// returns; every return path drops both.
async fn produce<R>(
    mut source: LineSource<R>,
    lines: mpsc::Sender<String>,
    errors: mpsc::Sender<LineError>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = source.next_line() => next,
        };

        match next {
            Some(Ok(line)) => {
                // A line read while cancellation races the hand-off is dropped
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    sent = lines.send(line) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Some(Err(err)) => {
                trace!(error = %err, "Producer stopping on read error");
                let _ = errors.try_send(err);
                return;
            }
            None => {
                trace!("Producer reached end of stream");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, ReadBuf};

    use crate::source::LineLimits;

    /// Reader wrapper that counts how often it is dropped (closed)
    struct Tracked<R> {
        inner: R,
        closes: Arc<AtomicUsize>,
    }

    impl<R> Tracked<R> {
        fn new(inner: R) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let tracked = Self {
                inner,
                closes: Arc::clone(&closes),
            };
            (tracked, closes)
        }
    }

    impl<R: AsyncRead + Unpin> AsyncRead for Tracked<R> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl<R> Drop for Tracked<R> {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_for_close(closes: &AtomicUsize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while closes.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend stream was not closed");
    }

    fn pipe_for<R>(reader: R) -> (LogPipe, CancellationToken)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let pipe = LogPipe::spawn(LineSource::new(reader), cancel.clone());
        (pipe, cancel)
    }

    #[tokio::test]
    async fn test_lines_then_end() {
        let (reader, closes) = Tracked::new(&b"start\nready\n"[..]);
        let (mut pipe, _cancel) = pipe_for(reader);

        assert_eq!(pipe.next().await, Some(PipeEvent::Line("start".into())));
        assert_eq!(pipe.next().await, Some(PipeEvent::Line("ready".into())));
        assert_eq!(pipe.next().await, Some(PipeEvent::End));
        assert_eq!(pipe.next().await, None);

        assert_eq!(pipe.outcome(), Some(StreamOutcome::Completed));
        assert_eq!(pipe.delivered(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        drop(pipe);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_ends_immediately() {
        let (mut pipe, _cancel) = pipe_for(&b""[..]);
        assert_eq!(pipe.next().await, Some(PipeEvent::End));
        assert_eq!(pipe.delivered(), 0);
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let input: String = (0..500).map(|i| format!("line {i}\n")).collect();
        let (mut pipe, _cancel) = pipe_for(std::io::Cursor::new(input.into_bytes()));

        for i in 0..500 {
            assert_eq!(pipe.next().await, Some(PipeEvent::Line(format!("line {i}"))));
        }
        assert_eq!(pipe.next().await, Some(PipeEvent::End));
    }

    #[tokio::test]
    async fn test_read_error_has_no_end() {
        let mock = tokio_test::io::Builder::new()
            .read(b"one\ntwo\n")
            .read_error(io::Error::new(io::ErrorKind::UnexpectedEof, "backend hung up"))
            .build();
        let (reader, closes) = Tracked::new(mock);
        let (mut pipe, _cancel) = pipe_for(reader);

        assert_eq!(pipe.next().await, Some(PipeEvent::Line("one".into())));
        assert_eq!(pipe.next().await, Some(PipeEvent::Line("two".into())));
        assert_eq!(pipe.next().await, None);

        assert_eq!(pipe.outcome(), Some(StreamOutcome::ReadFailed));
        assert!(matches!(pipe.read_error(), Some(LineError::Io(_))));
        wait_for_close(&closes).await;
        drop(pipe);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_too_long_line_fails_stream() {
        let input = format!("ok\n{}\n", "x".repeat(100));
        let cancel = CancellationToken::new();
        let limits = LineLimits { initial: 8, max: 64 };
        let source = LineSource::with_limits(std::io::Cursor::new(input.into_bytes()), limits);
        let mut pipe = LogPipe::spawn(source, cancel);

        assert_eq!(pipe.next().await, Some(PipeEvent::Line("ok".into())));
        assert_eq!(pipe.next().await, None);
        assert!(matches!(pipe.read_error(), Some(LineError::TooLong { limit: 64 })));
    }

    #[tokio::test]
    async fn test_cancel_before_first_line() {
        let (client, server) = tokio::io::duplex(64);
        let (reader, closes) = Tracked::new(server);
        let (mut pipe, cancel) = pipe_for(reader);

        cancel.cancel();
        assert_eq!(pipe.next().await, None);
        assert_eq!(pipe.outcome(), Some(StreamOutcome::Cancelled));

        wait_for_close(&closes).await;
        assert_eq!(pipe.next().await, None);
        drop(pipe);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        drop(client);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_hand_off() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (reader, closes) = Tracked::new(server);
        let (pipe, cancel) = pipe_for(reader);

        // Producer fills the channel and then blocks handing off the next line
        client.write_all(b"a\nb\nc\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        cancel.cancel();
        wait_for_close(&closes).await;
        assert_eq!(pipe.outcome(), None);
        drop(pipe);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consumer_drop_closes_backend_once() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (reader, closes) = Tracked::new(server);
        let (mut pipe, cancel) = pipe_for(reader);

        client.write_all(b"start\n").await.unwrap();
        assert_eq!(pipe.next().await, Some(PipeEvent::Line("start".into())));
        client.write_all(b"ready\n").await.unwrap();

        drop(pipe);
        assert!(cancel.is_cancelled());
        wait_for_close(&closes).await;

        // Backend side observes the close
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(client.write_all(b"more\n").await.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    struct Exploding;

    impl AsyncRead for Exploding {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            panic!("reader blew up");
        }
    }

    #[tokio::test]
    async fn test_panicked_producer_is_not_a_clean_end() {
        let (mut pipe, _cancel) = pipe_for(Exploding);

        assert_eq!(pipe.next().await, None);
        assert_eq!(pipe.outcome(), Some(StreamOutcome::ReadFailed));
        assert!(pipe.read_error().is_none());
        assert_eq!(pipe.next().await, None);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_session() {
        let shutdown = CancellationToken::new();
        let (_client, server) = tokio::io::duplex(64);
        let mut pipe = LogPipe::spawn(LineSource::new(server), shutdown.child_token());

        shutdown.cancel();
        assert_eq!(pipe.next().await, None);
        assert_eq!(pipe.outcome(), Some(StreamOutcome::Cancelled));
    }
}
