//! Request/poll state machine
//!
//! ```text
//! submit ── immediate ──────────────────────────────▶ success
//!    └──── accepted ─▶ wait ─▶ poll ── done ───────▶ success
//!                       ▲        ├──── failed ─────▶ domain_error
//!                       └────────┴──── queued/running (progress event)
//! budgets exhausted ───────────────────────────────▶ timed_out
//! cancel() from any non-terminal state ────────────▶ cancelled
//! ```

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, instrument, warn};

use crate::attempt::{Attempt, Finish, OperationHandle};
use crate::event::{EventKind, EventSink, OperationOutcome, ParsedEvent, TimeoutBudget};
use crate::transport::{JobApi, JobStatus, JobStatusReport, SubmitResponse};

use super::{JobHandle, PollPolicy};

const STRATEGY: &str = "poll";

/// Drives one submit and the status polls that follow it.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn JobApi>,
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(api: Arc<dyn JobApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Start the attempt. Progress and the terminal event go to `sink`.
    pub fn run(&self, sink: Arc<dyn EventSink>) -> OperationHandle {
        let attempt = Attempt::new(STRATEGY, sink);
        let body = drive(Arc::clone(&self.api), self.policy.clone(), Arc::clone(&attempt));
        attempt.spawn(body)
    }
}

#[instrument(skip_all, name = "job_poller")]
async fn drive(api: Arc<dyn JobApi>, policy: PollPolicy, attempt: Arc<Attempt>) -> Finish {
    let token = attempt.token().clone();

    let submitted = tokio::select! {
        biased;
        _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
        submitted = api.submit() => submitted,
    };

    let acceptance = match submitted {
        Ok(SubmitResponse::Immediate(payload)) => {
            info!("Submit returned an immediate result");
            return Finish::outcome(OperationOutcome::Success { payload });
        }
        Ok(SubmitResponse::Accepted(acceptance)) => acceptance,
        Err(e) => {
            warn!(error = %e, "Submit failed");
            return Finish::outcome(OperationOutcome::domain_error(e.code(), e.message()));
        }
    };

    let mut job = JobHandle::accepted(&acceptance);
    info!(
        job_id = %job.job_id(),
        status = %job.status(),
        poll_after_ms = ?acceptance.poll_after_ms,
        "Job accepted"
    );

    let mut backoff = policy.backoff(job.poll_interval_hint());
    let started = Instant::now();
    let deadline = started + policy.max_elapsed;
    let wall_clock = || {
        warn!(job_id = %acceptance.job_id, limit_ms = policy.max_elapsed.as_millis() as u64, "Polling wall-clock budget exhausted");
        Finish::outcome(OperationOutcome::timed_out(TimeoutBudget::wall_clock(
            policy.max_elapsed,
        )))
    };
    let mut attempts: u32 = 0;

    loop {
        if attempts >= policy.max_attempts {
            warn!(job_id = %job.job_id(), attempts, "Polling attempt budget exhausted");
            return Finish::outcome(OperationOutcome::timed_out(TimeoutBudget::Attempts {
                limit: policy.max_attempts,
            }));
        }

        let remaining = policy.max_elapsed.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return wall_clock();
        }

        let wait = backoff.current().min(remaining);
        debug!(job_id = %job.job_id(), wait_ms = wait.as_millis() as u64, "Waiting before next poll");

        tokio::select! {
            biased;
            _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
            _ = sleep(wait) => {}
        }

        if started.elapsed() >= policy.max_elapsed {
            return wall_clock();
        }

        attempts += 1;
        crate::metrics::record_poll();

        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => return Finish::outcome(OperationOutcome::Cancelled),
            _ = sleep_until(deadline) => return wall_clock(),
            polled = api.status(job.job_id()) => polled,
        };

        let report = match polled {
            Ok(report) => report,
            Err(e) => {
                warn!(job_id = %job.job_id(), attempt = attempts, error = %e, "Status poll failed");
                return Finish::outcome(OperationOutcome::domain_error(e.code(), e.message()));
            }
        };

        if job.apply(&report) {
            debug!(job_id = %job.job_id(), status = %job.status(), "Job status changed");
        }

        match report.status {
            JobStatus::Done => {
                info!(job_id = %job.job_id(), attempts, "Job finished");
                let payload = report.result.clone().unwrap_or(report.raw);
                return Finish::outcome(OperationOutcome::Success { payload });
            }
            JobStatus::Failed => {
                let (code, message) = report.failure();
                warn!(job_id = %job.job_id(), code = %code, message = %message, "Job failed");
                return Finish::outcome(OperationOutcome::domain_error(code, message));
            }
            JobStatus::Queued | JobStatus::Running => {
                attempt.emit(progress_event(&job, report));
                backoff.advance();
            }
        }
    }
}

fn progress_event(job: &JobHandle, report: JobStatusReport) -> ParsedEvent {
    let payload = match report.raw {
        Value::Null => json!({
            "job_id": job.job_id(),
            "status": job.status(),
            "progress": job.progress(),
        }),
        raw => raw,
    };
    ParsedEvent::new(EventKind::Progress, job.status().to_string(), payload)
}
