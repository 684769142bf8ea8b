//! Poll-pattern data models
//!
//! Typed shapes of the submit and status responses. Raw JSON is validated
//! here, at the transport boundary, so the poller never works on unchecked
//! values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TransportError, TransportResult};

/// Status of a server-side job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    #[serde(alias = "pending", alias = "in_progress")]
    Running,
    #[serde(alias = "completed", alias = "succeeded")]
    Done,
    #[serde(alias = "error")]
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Body of a 202 response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAcceptance {
    pub job_id: String,
    #[serde(default = "default_accepted_status")]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_after_ms: Option<u64>,
}

fn default_accepted_status() -> JobStatus {
    JobStatus::Queued
}

/// Result of the initial submit
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// The server answered synchronously
    Immediate(Value),
    /// The server queued a job to be polled
    Accepted(JobAcceptance),
}

impl SubmitResponse {
    /// Classify a successful submit response.
    ///
    /// A 202, or a body carrying `job_id` but neither `graph` nor `result`,
    /// is an acceptance; anything else is an immediate result.
    pub fn classify(status: u16, body: Value) -> TransportResult<Self> {
        let has_result = body.get("graph").is_some() || body.get("result").is_some();
        let has_job = body.get("job_id").is_some();

        if status == 202 || (has_job && !has_result) {
            let acceptance: JobAcceptance = serde_json::from_value(body).map_err(|e| {
                TransportError::InvalidResponse(format!("Malformed job acceptance: {}", e))
            })?;
            return Ok(SubmitResponse::Accepted(acceptance));
        }

        Ok(SubmitResponse::Immediate(body))
    }
}

/// Body of a status poll
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobStatusReport {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    /// The document as received, forwarded to the sink as progress payload
    #[serde(skip)]
    pub raw: Value,
}

impl JobStatusReport {
    /// Validate a status document.
    pub fn parse(value: Value) -> TransportResult<Self> {
        let mut report: JobStatusReport = serde_json::from_value(value.clone()).map_err(|e| {
            TransportError::InvalidResponse(format!("Malformed job status: {}", e))
        })?;
        report.raw = value;
        Ok(report)
    }

    /// `(code, message)` of a failed job.
    pub fn failure(&self) -> (String, String) {
        match &self.error {
            Some(error) => crate::event::fault_from_payload(error, "JOB_FAILED"),
            None => crate::event::fault_from_payload(&self.raw, "JOB_FAILED"),
        }
    }
}
