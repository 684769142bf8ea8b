//! Stream framing
//!
//! Byte chunks go through [`Utf8Decoder`], then [`FrameBuffer`], then one
//! of the frame parsers. [`FrameParser`] bundles the buffer mode with the
//! matching parser.

pub mod buffer;
pub mod decode;
pub mod ndjson;
pub mod sse;

pub use buffer::{FrameBuffer, FrameMode};
pub use decode::Utf8Decoder;
pub use ndjson::NdjsonRecordParser;
pub use sse::SseEventParser;

use crate::event::ParsedEvent;

/// Wire format of a streaming endpoint together with its parser.
#[derive(Debug, Clone)]
pub enum FrameParser {
    Sse(SseEventParser),
    Ndjson(NdjsonRecordParser),
}

impl FrameParser {
    pub fn mode(&self) -> FrameMode {
        match self {
            FrameParser::Sse(_) => FrameMode::Sse,
            FrameParser::Ndjson(_) => FrameMode::Ndjson,
        }
    }

    /// Label for logs and metrics.
    pub fn format(&self) -> &'static str {
        match self {
            FrameParser::Sse(_) => "sse",
            FrameParser::Ndjson(_) => "ndjson",
        }
    }

    pub fn parse(&self, frame: &str) -> Option<ParsedEvent> {
        match self {
            FrameParser::Sse(parser) => parser.parse(frame),
            FrameParser::Ndjson(parser) => parser.parse(frame),
        }
    }

    /// A fresh buffer in the matching mode.
    pub fn buffer(&self) -> FrameBuffer {
        FrameBuffer::new(self.mode())
    }
}
