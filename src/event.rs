//! Event and outcome types shared by every transport
//!
//! A [`ParsedEvent`] is what a parser produces from a frame and what a
//! consumer receives through its [`EventSink`]. An [`OperationOutcome`] is
//! the single terminal result of one attempt.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Classification of a parsed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Complete,
    Error,
    Custom(String),
}

impl EventKind {
    /// `Complete` and `Error` end an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error)
    }
}

/// A typed event dispatched to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvent {
    pub kind: EventKind,
    /// Raw event name or discriminant value as sent by the server
    pub name: String,
    pub payload: Value,
}

impl ParsedEvent {
    pub fn new(kind: EventKind, name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            payload,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// How names missing from an [`EventVocabulary`] are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownEvents {
    /// Treat as `Progress`
    Progress,
    /// Treat as `Custom(name)`
    Custom,
}

/// Caller-supplied mapping from wire event names to [`EventKind`].
///
/// Endpoints disagree on vocabulary (`complete` vs `result`, `<x>_saved`
/// notifications, ...), so the mapping is configuration rather than a
/// constant.
#[derive(Debug, Clone)]
pub struct EventVocabulary {
    kinds: HashMap<String, EventKind>,
    unknown: UnknownEvents,
}

impl EventVocabulary {
    /// Create an empty vocabulary with the given fallback.
    pub fn new(unknown: UnknownEvents) -> Self {
        Self {
            kinds: HashMap::new(),
            unknown,
        }
    }

    /// Map `name` to `kind`.
    pub fn with(mut self, name: impl Into<String>, kind: EventKind) -> Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    /// `progress`, `complete` and `error`; anything else is `Custom`.
    pub fn standard() -> Self {
        Self::new(UnknownEvents::Custom)
            .with("progress", EventKind::Progress)
            .with("complete", EventKind::Complete)
            .with("error", EventKind::Error)
    }

    /// Vocabulary of the metadata extraction SSE endpoint.
    ///
    /// `<domain>_saved` notifications fall through to `Custom`.
    pub fn extraction() -> Self {
        Self::standard()
    }

    /// Vocabulary of the NL-to-SQL NDJSON endpoint: `result` completes,
    /// `error` fails, every other step is progress.
    pub fn react() -> Self {
        Self::new(UnknownEvents::Progress)
            .with("result", EventKind::Complete)
            .with("error", EventKind::Error)
    }

    /// Classify a wire name.
    pub fn classify(&self, name: &str) -> EventKind {
        match self.kinds.get(name) {
            Some(kind) => kind.clone(),
            None => match self.unknown {
                UnknownEvents::Progress => EventKind::Progress,
                UnknownEvents::Custom => EventKind::Custom(name.to_string()),
            },
        }
    }

    /// Build an event for `name`.
    pub fn event(&self, name: &str, payload: Value) -> ParsedEvent {
        ParsedEvent::new(self.classify(name), name, payload)
    }
}

impl Default for EventVocabulary {
    fn default() -> Self {
        Self::standard()
    }
}

/// Consumer of events. Called zero or more times with progress/custom
/// events and at most once with a terminal event per attempt.
///
/// Sinks run on the attempt's task and should return quickly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ParsedEvent);
}

impl<F> EventSink for F
where
    F: Fn(ParsedEvent) + Send + Sync,
{
    fn emit(&self, event: ParsedEvent) {
        self(event)
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ParsedEvent) {}
}

/// Which poller budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutBudget {
    Attempts { limit: u32 },
    WallClock { limit_ms: u64 },
}

impl TimeoutBudget {
    pub fn wall_clock(limit: Duration) -> Self {
        TimeoutBudget::WallClock {
            limit_ms: limit.as_millis() as u64,
        }
    }

    /// Human readable description used in timeout messages.
    pub fn describe(&self) -> String {
        match self {
            TimeoutBudget::Attempts { limit } => {
                format!("analysis timed out after {} poll attempts", limit)
            }
            TimeoutBudget::WallClock { limit_ms } => {
                format!(
                    "analysis timed out after {}",
                    humanize(Duration::from_millis(*limit_ms))
                )
            }
        }
    }
}

fn humanize(duration: Duration) -> String {
    let millis = duration.as_millis();
    let plural = |n: u128, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };
    if millis >= 60_000 && millis % 60_000 == 0 {
        plural(millis / 60_000, "minute")
    } else if millis >= 1_000 && millis % 1_000 == 0 {
        plural(millis / 1_000, "second")
    } else {
        format!("{} ms", millis)
    }
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success { payload: Value },
    DomainError { code: String, message: String },
    Cancelled,
    TimedOut { budget: TimeoutBudget, message: String },
}

impl OperationOutcome {
    pub fn domain_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OperationOutcome::DomainError {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn timed_out(budget: TimeoutBudget) -> Self {
        OperationOutcome::TimedOut {
            message: budget.describe(),
            budget,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            OperationOutcome::Success { .. } => "success",
            OperationOutcome::DomainError { .. } => "domain_error",
            OperationOutcome::Cancelled => "cancelled",
            OperationOutcome::TimedOut { .. } => "timed_out",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationOutcome::Cancelled)
    }

    /// Terminal sink event matching this outcome, if it has one.
    ///
    /// Cancellation is silent and produces no event.
    pub(crate) fn terminal_event(&self) -> Option<ParsedEvent> {
        match self {
            OperationOutcome::Success { payload } => Some(ParsedEvent::new(
                EventKind::Complete,
                "complete",
                payload.clone(),
            )),
            OperationOutcome::DomainError { code, message } => Some(ParsedEvent::new(
                EventKind::Error,
                "error",
                serde_json::json!({ "code": code, "message": message }),
            )),
            OperationOutcome::TimedOut { message, .. } => Some(ParsedEvent::new(
                EventKind::Error,
                "timeout",
                serde_json::json!({ "code": "TIMED_OUT", "message": message }),
            )),
            OperationOutcome::Cancelled => None,
        }
    }
}

/// Pull `(code, message)` out of a server error document.
///
/// Accepts `{code, message}`, `{error: "..."}`, `{error: {code, message}}`
/// and `{detail: "..."}` shapes; anything else is stringified.
pub(crate) fn fault_from_payload(payload: &Value, default_code: &str) -> (String, String) {
    let nested = payload.get("error").filter(|e| e.is_object());
    let code = payload
        .get("code")
        .or_else(|| nested.and_then(|e| e.get("code")))
        .and_then(Value::as_str)
        .unwrap_or(default_code)
        .to_string();

    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .or_else(|| nested.and_then(|e| e.get("message")).and_then(Value::as_str))
        .or_else(|| payload.get("detail").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    (code, message)
}
