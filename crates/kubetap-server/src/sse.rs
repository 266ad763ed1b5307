//! Server-Sent Events framing for log sessions.
//!
//! Frames are written by hand so that every log line, including an empty
//! one, goes out as exactly one `data:` frame.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::HeaderName;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, Stream};
use tracing::trace;

use kubetap_logs::{PipeEvent, StreamSession};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

const END_FRAME: &str = "event: end\ndata: [END]\n\n";
const KEEP_ALIVE_FRAME: &str = ":\n\n";

/// Data frame for one log line: `data: <line>\n\n`
pub fn line_frame(line: &str) -> Bytes {
    let mut frame = String::with_capacity(line.len() + 8);
    frame.push_str("data: ");
    // SSE data cannot carry a carriage return
    frame.extend(line.chars().filter(|c| *c != '\r'));
    frame.push_str("\n\n");
    Bytes::from(frame)
}

/// Terminal frame for a stream that ended on its own
pub fn end_frame() -> Bytes {
    Bytes::from_static(END_FRAME.as_bytes())
}

/// Comment frame that keeps idle connections open
pub fn keep_alive_frame() -> Bytes {
    Bytes::from_static(KEEP_ALIVE_FRAME.as_bytes())
}

/// Frames of one session, in backend order.
///
/// Yields `end` only after a clean end of stream. The session is dropped as
/// soon as it has nothing more to send, or when axum drops the body because
/// the client went away; either way that releases the backend stream.
///
/// With `keep_alive` set, a comment frame goes out whenever the backend has
/// been quiet for that long.
pub fn event_stream(
    session: StreamSession,
    keep_alive: Option<Duration>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold(Some(session), move |state| async move {
        let mut session = state?;

        let event = match keep_alive {
            Some(interval) => match tokio::time::timeout(interval, session.next_event()).await {
                Ok(event) => event,
                Err(_) => return Some((Ok(keep_alive_frame()), Some(session))),
            },
            None => session.next_event().await,
        };

        match event {
            Some(PipeEvent::Line(line)) => Some((Ok(line_frame(&line)), Some(session))),
            Some(PipeEvent::End) => Some((Ok(end_frame()), None)),
            None => {
                trace!(outcome = ?session.outcome(), "Event stream finished without end frame");
                None
            }
        }
    })
}

/// Streaming response with proxy buffering and caching disabled.
pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
