//! Client-side view of a server job

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::transport::{JobAcceptance, JobStatus, JobStatusReport};

/// Job accepted by the server and tracked by the poller.
///
/// Only the poller updates it, from the status reports it receives.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    job_id: String,
    status: JobStatus,
    progress: Option<f64>,
    poll_interval_hint: Option<Duration>,
    created_at: DateTime<Utc>,
}

impl JobHandle {
    pub(crate) fn accepted(acceptance: &JobAcceptance) -> Self {
        Self {
            job_id: acceptance.job_id.clone(),
            status: acceptance.status,
            progress: None,
            poll_interval_hint: acceptance.poll_after_ms.map(Duration::from_millis),
            created_at: Utc::now(),
        }
    }

    /// Record a status report. Returns `true` when the status changed.
    pub(crate) fn apply(&mut self, report: &JobStatusReport) -> bool {
        let changed = self.status != report.status;
        self.status = report.status;
        if report.progress.is_some() {
            self.progress = report.progress;
        }
        changed
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn poll_interval_hint(&self) -> Option<Duration> {
        self.poll_interval_hint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
