//! NDJSON record parsing

use serde_json::Value;
use tracing::debug;

use crate::event::{EventVocabulary, ParsedEvent};

/// Parser for NDJSON lines produced by a [`FrameBuffer`](super::FrameBuffer)
/// in NDJSON mode.
///
/// Each record's kind is selected by a discriminant field. The first
/// configured field present on the record wins.
#[derive(Debug, Clone)]
pub struct NdjsonRecordParser {
    vocabulary: EventVocabulary,
    discriminants: Vec<String>,
}

impl NdjsonRecordParser {
    /// Create a parser using the default discriminants `step` then `type`.
    pub fn new(vocabulary: EventVocabulary) -> Self {
        Self {
            vocabulary,
            discriminants: vec!["step".to_string(), "type".to_string()],
        }
    }

    /// Replace the discriminant field names.
    pub fn with_discriminants<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discriminants = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Parse one line. Blank and malformed lines yield `None`.
    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let record: Value = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, len = line.len(), "Skipping malformed NDJSON line");
                crate::metrics::record_dropped_frame("ndjson");
                return None;
            }
        };

        let name = self
            .discriminants
            .iter()
            .find_map(|field| record.get(field).and_then(Value::as_str))
            .unwrap_or(super::sse::DEFAULT_EVENT_NAME)
            .to_string();

        Some(self.vocabulary.event(&name, record))
    }
}

impl Default for NdjsonRecordParser {
    fn default() -> Self {
        Self::new(EventVocabulary::react())
    }
}
