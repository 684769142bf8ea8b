//! opflow - async operation client for long-running analysis endpoints
//!
//! Runs backend operations that finish later, either by submitting a job
//! and polling its status or by consuming an SSE / NDJSON stream, and
//! reports progress through an [`EventSink`] plus one terminal
//! [`OperationOutcome`] per attempt. The [`OperationController`] keeps at
//! most one attempt alive per slot.

pub mod api;
pub mod attempt;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod framing;
pub mod metrics;
pub mod poll;
pub mod stream;
pub mod transport;

pub use crate::api::AnalysisApi;
pub use crate::attempt::OperationHandle;
pub use crate::config::Config;
pub use crate::controller::{OperationController, OperationNotice, Strategy};
pub use crate::error::{TransportError, TransportResult};
pub use crate::event::{
    EventKind, EventSink, EventVocabulary, NullSink, OperationOutcome, ParsedEvent,
    TimeoutBudget, UnknownEvents,
};
pub use crate::framing::FrameParser;
pub use crate::poll::{JobHandle, JobPoller, PollPolicy};
pub use crate::stream::{StreamOptions, StreamSession};
pub use crate::transport::{JobApi, StreamRequest, StreamResponse, StreamTransport};
