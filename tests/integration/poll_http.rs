//! Request/poll over HTTP
//!
//! Tests for the 202 pattern:
//! - immediate results skip polling
//! - accepted jobs are polled until done or failed
//! - rejected submits and exhausted budgets surface as outcomes

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use opflow::{EventKind, OperationController, OperationOutcome, PollPolicy, Strategy, TimeoutBudget};

use crate::common::{fast_policy, test_api, RecordingSink};
use crate::mocks::backend::{MockBackend, STATUS_PREFIX, SUBMIT_PATH};

#[tokio::test]
async fn test_immediate_result_skips_polling() {
    let backend = MockBackend::start().await;
    backend
        .mock_submit_immediate(json!({"graph": {"nodes": ["a"]}, "paths": []}))
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();
    let controller = OperationController::new();

    let outcome = controller
        .run("impact:k1", api.impact_graph(json!({"kpi_id": "k1"})), sink.shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::Success {
            payload: json!({"graph": {"nodes": ["a"]}, "paths": []})
        }
    );
    assert_eq!(sink.names(), vec!["complete".to_string()]);
    assert_eq!(backend.count_requests(STATUS_PREFIX).await, 0);

    let submit = &backend.received_requests().await[0];
    assert_eq!(submit.url.path(), SUBMIT_PATH);
    let body: serde_json::Value = serde_json::from_slice(&submit.body).unwrap();
    assert_eq!(body, json!({"kpi_id": "k1"}));
}

#[tokio::test]
async fn test_accepted_job_polls_until_done() {
    let backend = MockBackend::start().await;
    backend.mock_submit_accepted("job-7", 10).await;
    backend.mock_status_running("job-7", 2).await;
    backend.mock_status_done("job-7", json!({"graph": {}})).await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();
    let controller = OperationController::new();

    let outcome = controller
        .run("impact:k1", api.impact_graph(json!({"kpi_id": "k1"})), sink.shared())
        .await;

    assert_eq!(outcome, OperationOutcome::Success { payload: json!({"graph": {}}) });
    assert_eq!(backend.count_requests(STATUS_PREFIX).await, 3);

    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert!(events[..2].iter().all(|e| e.kind == EventKind::Progress));
    assert_eq!(events[0].name, "running");
    assert_eq!(events[0].payload["progress"], 0.5);
    assert_eq!(events[2].kind, EventKind::Complete);
    assert_eq!(sink.terminal_count(), 1);
}

#[tokio::test]
async fn test_failed_job_surfaces_domain_error() {
    let backend = MockBackend::start().await;
    backend.mock_submit_accepted("job-8", 10).await;
    backend
        .mock_status_failed("job-8", "GRAPH_TOO_LARGE", "Graph exceeds 500 nodes")
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("impact:k2", api.impact_graph(json!({})), sink.shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::domain_error("GRAPH_TOO_LARGE", "Graph exceeds 500 nodes")
    );
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Error);
    assert_eq!(events[0].payload["code"], "GRAPH_TOO_LARGE");
}

#[tokio::test]
async fn test_rejected_submit_uses_server_message() {
    let backend = MockBackend::start().await;
    backend
        .mock_submit_rejected(422, json!({"detail": "kpi_id is required"}))
        .await;

    let api = test_api(&backend.uri());
    let outcome = OperationController::new()
        .run("impact:k3", api.impact_graph(json!({})), RecordingSink::new().shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::domain_error("HTTP_422", "kpi_id is required")
    );
    assert_eq!(backend.count_requests(STATUS_PREFIX).await, 0);
}

#[tokio::test]
async fn test_attempt_budget_exhausted() {
    let backend = MockBackend::start().await;
    backend.mock_submit_accepted("job-9", 5).await;
    backend.mock_status_stuck("job-9").await;

    let api = test_api(&backend.uri());
    let policy = PollPolicy {
        max_attempts: 3,
        ..fast_policy()
    };
    let strategy = api.poll_with("/api/impact/graph", "/api/jobs", json!({}), policy);
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("impact:k4", strategy, sink.shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::timed_out(TimeoutBudget::Attempts { limit: 3 })
    );
    assert_eq!(backend.count_requests(STATUS_PREFIX).await, 3);
    assert_eq!(sink.terminal_count(), 1);
    assert_eq!(sink.events().last().unwrap().name, "timeout");
}

#[tokio::test]
async fn test_cancel_while_polling() {
    let backend = MockBackend::start().await;
    backend.mock_submit_accepted("job-10", 20).await;
    backend.mock_status_stuck("job-10").await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();
    let controller = OperationController::new();

    let handle = controller.start("impact:k5", api.impact_graph(json!({})), sink.shared());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(controller.cancel_slot("impact:k5"));

    assert_eq!(handle.completion().await, OperationOutcome::Cancelled);
    // let an in-flight poll land before taking the baseline
    tokio::time::sleep(Duration::from_millis(20)).await;
    let polls = backend.count_requests(STATUS_PREFIX).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.count_requests(STATUS_PREFIX).await, polls);
    assert_eq!(sink.terminal_count(), 0);
}

#[tokio::test]
async fn test_done_without_result_returns_report() {
    let backend = MockBackend::start().await;
    backend.mock_submit_accepted("job-11", 5).await;
    backend.mock_status_done("job-11", json!(null)).await;

    let api = test_api(&backend.uri());
    let outcome = OperationController::new()
        .run("impact:k6", api.impact_graph(json!({})), RecordingSink::new().shared())
        .await;

    // `result: null` means the report itself is the payload
    match outcome {
        OperationOutcome::Success { payload } => assert_eq!(payload["status"], "completed"),
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_strategy_for_custom_paths() {
    let api = test_api("http://backend.local");
    match api.poll(SUBMIT_PATH, "/api/jobs", json!({})) {
        Strategy::Poll { policy, .. } => assert_eq!(policy, fast_policy()),
        other => panic!("expected poll strategy, got {:?}", other),
    }
}
