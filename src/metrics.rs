//! Operation metrics
//!
//! Counters are recorded through the `metrics` facade. Nothing is
//! exported unless the embedding application installs a recorder.

/// Describe all metrics (call once at startup, after installing a recorder)
pub fn describe_metrics() {
    metrics::describe_counter!(
        "opflow_operations_total",
        "Finished operation attempts by strategy and outcome"
    );
    metrics::describe_counter!(
        "opflow_frames_dropped_total",
        "Frames or lines dropped because their payload was malformed"
    );
    metrics::describe_counter!("opflow_polls_total", "Job status polls issued");
    metrics::describe_counter!(
        "opflow_superseded_total",
        "Attempts cancelled because a newer attempt took their slot"
    );
}

/// Record a finished attempt
pub fn record_outcome(strategy: &'static str, outcome: &'static str) {
    metrics::counter!(
        "opflow_operations_total",
        "strategy" => strategy,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a frame dropped by a parser
pub fn record_dropped_frame(format: &'static str) {
    metrics::counter!("opflow_frames_dropped_total", "format" => format).increment(1);
}

/// Record one status poll
pub fn record_poll() {
    metrics::counter!("opflow_polls_total").increment(1);
}

/// Record a superseded attempt
pub fn record_superseded() {
    metrics::counter!("opflow_superseded_total").increment(1);
}
