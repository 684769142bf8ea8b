//! Streaming (SSE / NDJSON) operations

pub mod session;

pub use session::{StreamOptions, StreamSession, STREAM_ENDED_WITHOUT_RESULT, STREAM_ERROR};
