//! Transport seam
//!
//! The HTTP client itself is a collaborator: the poller talks to a
//! [`JobApi`] and the stream session to a [`StreamTransport`]. The
//! reqwest-backed implementations live in [`http`]; tests substitute
//! in-memory ones.

pub mod http;
pub mod models;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::TransportResult;

pub use http::{HttpJobApi, HttpStreamTransport};
pub use models::{JobAcceptance, JobStatus, JobStatusReport, SubmitResponse};

/// Body of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = TransportResult<Bytes>> + Send>>;

/// Request/poll endpoint pair.
///
/// `submit` is the initial request; `status` polls one job. Both return
/// shapes already validated by the transport.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit(&self) -> TransportResult<SubmitResponse>;

    async fn status(&self, job_id: &str) -> TransportResult<JobStatusReport>;
}

/// HTTP method of a streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMethod {
    Get,
    Post,
}

/// One streaming exchange to open
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub method: StreamMethod,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl StreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: StreamMethod::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: StreamMethod::Post,
            url: url.into(),
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Opened streaming response; the body has not been read yet
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read at most `limit` bytes of the body as lossy text.
    ///
    /// Used for diagnostics on a rejected response.
    pub async fn text(mut self, limit: usize) -> String {
        let mut collected = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(bytes) => {
                    let room = limit.saturating_sub(collected.len());
                    collected.extend_from_slice(&bytes[..bytes.len().min(room)]);
                    if collected.len() >= limit {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens streaming HTTP exchanges
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> TransportResult<StreamResponse>;
}
