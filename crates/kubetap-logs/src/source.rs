use std::io;

use bytes::BytesMut;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

use kubetap_types::{INITIAL_LINE_BUFFER, MAX_LINE_BYTES};

/// Terminal failure while reading log lines
#[derive(Debug, Error)]
pub enum LineError {
    #[error("log line exceeds {limit} bytes")]
    TooLong { limit: usize },

    #[error("failed to read log stream: {0}")]
    Io(#[from] io::Error),
}

/// Read buffer sizing for a [`LineSource`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineLimits {
    /// Buffer capacity allocated up front
    pub initial: usize,

    /// Longest accepted line, excluding the newline
    pub max: usize,
}

impl Default for LineLimits {
    fn default() -> Self {
        Self {
            initial: INITIAL_LINE_BUFFER,
            max: MAX_LINE_BYTES,
        }
    }
}

/// Newline-delimited decoder with a hard cap on line length.
///
/// Lines are decoded lossily as UTF-8 and lose their `\n` / `\r\n` terminator.
#[derive(Clone, Debug)]
pub struct LineCodec {
    max_length: usize,

    /// Bytes of the buffer already known to contain no newline
    next_index: usize,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut, len: usize, consumed: usize) -> String {
        self.next_index = 0;
        let mut line = buf.split_to(consumed);
        line.truncate(len);
        if line.last() == Some(&b'\r') {
            line.truncate(len - 1);
        }
        String::from_utf8_lossy(&line).into_owned()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LineError> {
        let read_to = buf.len().min(self.max_length.saturating_add(1));

        let newline = buf[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(pos) => Ok(Some(self.take_line(buf, pos, pos + 1))),
            None if buf.len() > self.max_length => Err(LineError::TooLong {
                limit: self.max_length,
            }),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LineError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // Unterminated last line
        let len = buf.len();
        Ok(Some(self.take_line(buf, len, len)))
    }
}

/// Sequence of text lines read from a raw log byte stream.
///
/// Yields lines until the stream ends or fails. After the first `None` or
/// error the source is exhausted and must be rebuilt from a fresh stream.
pub struct LineSource<R> {
    frames: FramedRead<R, LineCodec>,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    /// Wrap `reader` with the default 4 KiB start / 1 MiB cap buffer
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, LineLimits::default())
    }

    pub fn with_limits(reader: R, limits: LineLimits) -> Self {
        Self {
            frames: FramedRead::with_capacity(reader, LineCodec::new(limits.max), limits.initial),
            exhausted: false,
        }
    }

    /// Next line, `None` at end of stream
    pub async fn next_line(&mut self) -> Option<Result<String, LineError>> {
        if self.exhausted {
            return None;
        }
        let next = self.frames.next().await;
        if !matches!(next, Some(Ok(_))) {
            self.exhausted = true;
        }
        next
    }
}
