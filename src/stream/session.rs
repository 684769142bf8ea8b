//! One streaming exchange
//!
//! Chunks flow decoder -> frame buffer -> parser -> sink on a single task,
//! so events reach the sink in exactly the order their frames completed.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::attempt::{Attempt, Finish, OperationHandle};
use crate::error::TransportError;
use crate::event::{
    fault_from_payload, EventKind, EventSink, EventVocabulary, OperationOutcome, ParsedEvent,
};
use crate::framing::{FrameParser, NdjsonRecordParser, SseEventParser, Utf8Decoder};
use crate::transport::{StreamRequest, StreamTransport};

const STRATEGY: &str = "stream";

/// Outcome code when the body ends before any terminal event.
pub const STREAM_ENDED_WITHOUT_RESULT: &str = "STREAM_ENDED_WITHOUT_RESULT";

/// Default outcome code for an `error` event without its own code.
pub const STREAM_ERROR: &str = "STREAM_ERROR";

/// Wire format and limits of a streaming endpoint
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub parser: FrameParser,
    /// How much of a rejected response body is read for the diagnostic
    pub error_body_limit: usize,
}

impl StreamOptions {
    pub fn new(parser: FrameParser) -> Self {
        Self {
            parser,
            error_body_limit: 64 * 1024,
        }
    }

    /// SSE framing with the given vocabulary
    pub fn sse(vocabulary: EventVocabulary) -> Self {
        Self::new(FrameParser::Sse(SseEventParser::new(vocabulary)))
    }

    /// NDJSON framing with the given record parser
    pub fn ndjson(parser: NdjsonRecordParser) -> Self {
        Self::new(FrameParser::Ndjson(parser))
    }
}

/// Opens streaming exchanges and drives them to one outcome each.
#[derive(Clone)]
pub struct StreamSession {
    transport: Arc<dyn StreamTransport>,
    options: StreamOptions,
}

impl StreamSession {
    pub fn new(transport: Arc<dyn StreamTransport>, options: StreamOptions) -> Self {
        Self { transport, options }
    }

    /// Open `request` and start dispatching its events to `sink`.
    pub fn open(&self, request: StreamRequest, sink: Arc<dyn EventSink>) -> OperationHandle {
        let attempt = Attempt::new(STRATEGY, sink);
        let body = drive(
            Arc::clone(&self.transport),
            request,
            self.options.clone(),
            Arc::clone(&attempt),
        );
        attempt.spawn(body)
    }
}

#[instrument(skip_all, name = "stream_session", fields(url = %request.url, format = options.parser.format()))]
async fn drive(
    transport: Arc<dyn StreamTransport>,
    request: StreamRequest,
    options: StreamOptions,
    attempt: Arc<Attempt>,
) -> Finish {
    let token = attempt.token().clone();
    let parser = options.parser;

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
        opened = transport.open(&request) => opened,
    };

    let mut response = match opened {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Failed to open stream");
            return Finish::outcome(OperationOutcome::domain_error(e.code(), e.message()));
        }
    };

    if !response.is_success() {
        let status = response.status;
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
            body = response.text(options.error_body_limit) => body,
        };
        warn!(status, body = %body, "Stream rejected");
        let rejected = TransportError::Status { status, body };
        return Finish::outcome(OperationOutcome::domain_error(
            rejected.code(),
            rejected.message(),
        ));
    }

    let mut decoder = Utf8Decoder::new();
    let mut buffer = parser.buffer();
    let mut frames: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
            next = response.body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let text = decoder.decode(&chunk);
                for frame in buffer.push(&text) {
                    if token.is_cancelled() {
                        return Finish::outcome(OperationOutcome::Cancelled);
                    }
                    frames += 1;
                    if let Some(finish) = dispatch(&parser, &attempt, &frame) {
                        info!(frames, "Stream reached a terminal event");
                        return finish;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, frames, "Stream body failed");
                return Finish::outcome(OperationOutcome::domain_error(e.code(), e.message()));
            }
            None => break,
        }
    }

    debug!(frames, pending = buffer.pending_len(), "Stream ended, flushing");

    let tail = decoder.finish();
    let mut remaining = buffer.push(&tail);
    remaining.extend(buffer.flush());
    for frame in remaining {
        if let Some(finish) = dispatch(&parser, &attempt, &frame) {
            return finish;
        }
    }

    warn!(frames, "Stream ended without a terminal event");
    Finish::outcome(OperationOutcome::domain_error(
        STREAM_ENDED_WITHOUT_RESULT,
        "Stream ended without a result",
    ))
}

/// Parse a frame and either forward it or turn it into the attempt's result.
fn dispatch(parser: &FrameParser, attempt: &Attempt, frame: &str) -> Option<Finish> {
    let event = parser.parse(frame)?;
    match event.kind {
        EventKind::Complete => {
            let payload = event.payload.clone();
            Some(Finish::with_event(OperationOutcome::Success { payload }, event))
        }
        EventKind::Error => {
            let (code, message) = fault_from_payload(&event.payload, STREAM_ERROR);
            Some(Finish::with_event(
                OperationOutcome::domain_error(code, message),
                event,
            ))
        }
        EventKind::Progress | EventKind::Custom(_) => {
            forward(attempt, event);
            None
        }
    }
}

fn forward(attempt: &Attempt, event: ParsedEvent) {
    debug!(event = %event.name, "Dispatching stream event");
    attempt.emit(event);
}
