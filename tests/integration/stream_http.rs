//! SSE and NDJSON over HTTP

use pretty_assertions::assert_eq;
use serde_json::json;

use opflow::{EventKind, OperationController, OperationOutcome};

use crate::common::{test_api, RecordingSink};
use crate::mocks::backend::{MockBackend, EXTRACT_PATH, REACT_PATH};

#[tokio::test]
async fn test_sse_extraction_flow() {
    let backend = MockBackend::start().await;
    backend
        .mock_sse(concat!(
            ": keep-alive\n\n",
            "event: progress\ndata: {\"stage\":\"profiling\",\"pct\":10}\n\n",
            "event: table_saved\ndata: {\"table\":\"orders\"}\n\n",
            "event: progress\r\ndata: {\"stage\":\"naming\",\"pct\":80}\r\n\r\n",
            "event: complete\ndata: {\"tables\":1}\n\n",
        ))
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("extract:db1", api.extract_metadata(json!({"db": "db1"})), sink.shared())
        .await;

    assert_eq!(outcome, OperationOutcome::Success { payload: json!({"tables": 1}) });
    assert_eq!(
        sink.names(),
        vec!["progress", "table_saved", "progress", "complete"]
    );
    let events = sink.events();
    assert_eq!(events[1].kind, EventKind::Custom("table_saved".to_string()));
    assert_eq!(events[2].payload["pct"], 80);
}

#[tokio::test]
async fn test_sse_error_event() {
    let backend = MockBackend::start().await;
    backend
        .mock_sse(concat!(
            "event: progress\ndata: {\"pct\":5}\n\n",
            "event: error\ndata: {\"code\":\"SOURCE_UNREACHABLE\",\"message\":\"db1 is down\"}\n\n",
            "event: complete\ndata: {}\n\n",
        ))
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("extract:db1", api.extract_metadata(json!({})), sink.shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::domain_error("SOURCE_UNREACHABLE", "db1 is down")
    );
    assert_eq!(sink.names(), vec!["progress", "error"]);
    assert_eq!(sink.terminal_count(), 1);
}

#[tokio::test]
async fn test_sse_malformed_frame_is_skipped() {
    let backend = MockBackend::start().await;
    backend
        .mock_sse(concat!(
            "event: progress\ndata: {not json\n\n",
            "event: complete\ndata: {\"ok\":true}\n\n",
        ))
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("extract:db2", api.extract_metadata(json!({})), sink.shared())
        .await;

    assert!(outcome.is_success());
    assert_eq!(sink.names(), vec!["parse_error", "complete"]);
}

#[tokio::test]
async fn test_sse_without_terminal_event() {
    let backend = MockBackend::start().await;
    backend
        .mock_sse("event: progress\ndata: {\"pct\":50}\n\n")
        .await;

    let api = test_api(&backend.uri());
    let outcome = OperationController::new()
        .run("extract:db3", api.extract_metadata(json!({})), RecordingSink::new().shared())
        .await;

    match outcome {
        OperationOutcome::DomainError { code, .. } => {
            assert_eq!(code, opflow::stream::STREAM_ENDED_WITHOUT_RESULT)
        }
        other => panic!("expected domain error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ndjson_react_flow() {
    let backend = MockBackend::start().await;
    backend
        .mock_ndjson(&[
            json!({"step": "select", "iteration": 1, "tables": ["sales"]}),
            json!({"step": "generate", "iteration": 1, "sql": "SELECT 1"}),
            json!({"step": "validate", "iteration": 1, "ok": false}),
            json!({"step": "fix", "iteration": 2, "sql": "SELECT region, sum(x) FROM sales"}),
            json!({"step": "result", "iteration": 2, "sql": "SELECT region, sum(x) FROM sales", "rows": 4}),
        ])
        .await;

    let api = test_api(&backend.uri());
    let sink = RecordingSink::new();

    let outcome = OperationController::new()
        .run("sql:q1", api.react_sql(json!({"question": "sales by region"})), sink.shared())
        .await;

    match &outcome {
        OperationOutcome::Success { payload } => {
            assert_eq!(payload["rows"], 4);
            assert_eq!(payload["iteration"], 2);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(
        sink.names(),
        vec!["select", "generate", "validate", "fix", "result"]
    );
    assert!(sink.events()[..4].iter().all(|e| e.kind == EventKind::Progress));
}

#[tokio::test]
async fn test_ndjson_error_step() {
    let backend = MockBackend::start().await;
    backend
        .mock_ndjson(&[
            json!({"step": "select", "iteration": 1}),
            json!({"step": "error", "iteration": 1, "code": "MAX_ITERATIONS", "message": "Gave up after 5 iterations"}),
        ])
        .await;

    let api = test_api(&backend.uri());
    let outcome = OperationController::new()
        .run("sql:q2", api.react_sql(json!({})), RecordingSink::new().shared())
        .await;

    assert_eq!(
        outcome,
        OperationOutcome::domain_error("MAX_ITERATIONS", "Gave up after 5 iterations")
    );
}

#[tokio::test]
async fn test_stream_rejected_with_status() {
    let backend = MockBackend::start().await;
    backend
        .mock_stream_failure(REACT_PATH, 503, json!({"error": "model overloaded"}))
        .await;
    backend
        .mock_stream_failure(EXTRACT_PATH, 401, json!({"detail": "token expired"}))
        .await;

    let api = test_api(&backend.uri());
    let controller = OperationController::new();
    let sink = RecordingSink::new();

    let outcome = controller
        .run("sql:q3", api.react_sql(json!({})), sink.shared())
        .await;
    assert_eq!(
        outcome,
        OperationOutcome::domain_error("HTTP_503", "model overloaded")
    );

    let outcome = controller
        .run("extract:db4", api.extract_metadata(json!({})), sink.shared())
        .await;
    assert_eq!(outcome, OperationOutcome::domain_error("HTTP_401", "token expired"));
    assert_eq!(sink.names(), vec!["error", "error"]);
}

#[tokio::test]
async fn test_connection_refused() {
    // nothing listens on port 9 of the loopback interface
    let api = test_api("http://127.0.0.1:9");
    let outcome = OperationController::new()
        .run("extract:down", api.extract_metadata(json!({})), RecordingSink::new().shared())
        .await;

    match outcome {
        OperationOutcome::DomainError { code, .. } => assert_eq!(code, "CONNECTION_FAILED"),
        other => panic!("expected connection failure, got {:?}", other),
    }
}
