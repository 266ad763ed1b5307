//! Log relay for kubetap
//!
//! This crate turns a raw container log byte stream into a sequence of text
//! lines and relays them, one at a time, from a background reader task to the
//! task serving the client, under cancellation.

mod pipe;
mod session;
mod source;

pub use pipe::{LogPipe, PipeEvent, StreamOutcome};
pub use session::{ActiveStreams, StreamSession};
pub use source::{LineCodec, LineError, LineLimits, LineSource};
