//! Mock analysis backend
//!
//! Provides wiremock-based mocks for the endpoint families:
//! - POST /api/impact/graph - Submit (immediate or 202 job acceptance)
//! - GET /api/jobs/{id} - Job status
//! - POST /api/metadata/extract - SSE stream
//! - POST /api/nl2sql/react - NDJSON stream

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const SUBMIT_PATH: &str = "/api/impact/graph";
pub const STATUS_PREFIX: &str = "/api/jobs";
pub const EXTRACT_PATH: &str = "/api/metadata/extract";
pub const REACT_PATH: &str = "/api/nl2sql/react";

/// Mock backend wrapper
pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests whose path starts with `prefix`
    pub async fn count_requests(&self, prefix: &str) -> usize {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.url.path().starts_with(prefix))
            .count()
    }

    /// Submit answers with the result directly
    pub async fn mock_submit_immediate(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Submit answers 202 with a job acceptance
    pub async fn mock_submit_accepted(&self, job_id: &str, poll_after_ms: u64) {
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "job_id": job_id,
                "status": "queued",
                "poll_after_ms": poll_after_ms,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_submit_rejected(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Status answers `running` for the first `times` polls
    pub async fn mock_status_running(&self, job_id: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", STATUS_PREFIX, job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": job_id,
                "status": "running",
                "progress": 0.5,
            })))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Status answers `running` forever
    pub async fn mock_status_stuck(&self, job_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", STATUS_PREFIX, job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": job_id,
                "status": "running",
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_status_done(&self, job_id: &str, result: Value) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", STATUS_PREFIX, job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": job_id,
                "status": "completed",
                "result": result,
            })))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_status_failed(&self, job_id: &str, code: &str, message: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", STATUS_PREFIX, job_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job_id": job_id,
                "status": "failed",
                "error": {"code": code, "message": message},
            })))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// SSE endpoint returning `body` verbatim
    pub async fn mock_sse(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path(EXTRACT_PATH))
            .and(header("accept", "text/event-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// SSE endpoint that only answers after `delay`
    pub async fn mock_sse_delayed(&self, body: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(EXTRACT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body.to_string(), "text/event-stream")
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_ndjson(&self, lines: &[Value]) {
        let body: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        Mock::given(method("POST"))
            .and(path(REACT_PATH))
            .and(header("accept", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_stream_failure(&self, route: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}
