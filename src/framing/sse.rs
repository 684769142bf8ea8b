//! SSE block parsing
//!
//! Turns one blank-line-delimited block into a [`ParsedEvent`].

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::event::{EventKind, EventVocabulary, ParsedEvent};

/// Name used when a block carries no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Name of the diagnostic event emitted for an unparsable payload.
pub const PARSE_ERROR_EVENT: &str = "parse_error";

/// Parser for SSE blocks produced by a [`FrameBuffer`](super::FrameBuffer)
/// in SSE mode.
#[derive(Debug, Clone, Default)]
pub struct SseEventParser {
    vocabulary: EventVocabulary,
}

impl SseEventParser {
    pub fn new(vocabulary: EventVocabulary) -> Self {
        Self { vocabulary }
    }

    /// Parse one block.
    ///
    /// Returns `None` for blocks without data (comments, keep-alives).
    /// A payload that is not JSON yields a `Custom("parse_error")`
    /// diagnostic in place of the event.
    pub fn parse(&self, frame: &str) -> Option<ParsedEvent> {
        let mut name: Option<&str> = None;
        let mut data: Option<String> = None;

        for line in frame.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => name = Some(value),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                // id, retry and unknown fields carry nothing we dispatch on
                _ => {}
            }
        }

        let data = data?;
        let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_EVENT_NAME);

        match serde_json::from_str::<Value>(&data) {
            Ok(payload) => {
                debug!(event = %name, "Parsed SSE event");
                Some(self.vocabulary.event(name, payload))
            }
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping SSE frame with malformed payload");
                crate::metrics::record_dropped_frame("sse");
                Some(ParsedEvent::new(
                    EventKind::Custom(PARSE_ERROR_EVENT.to_string()),
                    PARSE_ERROR_EVENT,
                    json!({ "event": name, "raw": data, "error": e.to_string() }),
                ))
            }
        }
    }
}
