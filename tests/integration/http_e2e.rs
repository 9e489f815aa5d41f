//! End-to-end tests over HTTP.
//!
//! These tests start the orchestrator on an ephemeral port and talk to it
//! with raw reqwest calls and with the polling `Agent`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use calcflow::agent::Agent;
use calcflow::config::OperationTimings;
use calcflow::core::{ExpressionId, TaskId};
use calcflow::orchestration::WorkerPool;
use calcflow::Error;

use crate::fixtures::{wait_for_result, TestServer};

/// Test: Public API lifecycle
/// Given a running orchestrator
/// When an expression is posted and its tasks answered over HTTP
/// Then the expression endpoints report progress and the final value
#[tokio::test]
async fn test_public_api_lifecycle() {
    let server = TestServer::start(OperationTimings::uniform(0)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/api/v1/calculate"))
        .json(&json!({"expression": "2*3+4"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"id": 1}));

    let body: Value = client
        .get(server.url("/api/v1/expressions/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"expression": {"id": 1, "expression": "2*3+4", "status": "pending"}})
    );

    for expected in [json!([2.0, "*", 3.0]), json!([6.0, "+", 4.0])] {
        let response = client.get(server.url("/internal/task")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task: Value = response.json().await.unwrap();
        let task = &task["task"];
        assert_eq!(json!([task["arg1"], task["operation"], task["arg2"]]), expected);
        assert_eq!(task["operation_time"], json!(0));

        let result = match task["operation"].as_str() {
            Some("*") => 6.0,
            _ => 10.0,
        };
        let response = client
            .post(server.url("/internal/task"))
            .json(&json!({"id": task["id"], "result": result}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"status": "result accepted"}));
    }

    let body: Value = client
        .get(server.url("/api/v1/expressions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"expressions": [
            {"id": 1, "expression": "2*3+4", "status": "completed", "result": 10.0}
        ]})
    );

    drop(client);
    server.stop().await;
}

/// Test: Error responses
/// Given a running orchestrator with no work
/// When malformed, unknown or empty requests are made
/// Then 422 and 404 responses carry an error message
#[tokio::test]
async fn test_error_responses() {
    let server = TestServer::start(OperationTimings::uniform(0)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/api/v1/calculate"))
        .json(&json!({"expression": "2+*3"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid expression"));

    let response = client
        .get(server.url("/api/v1/expressions/7"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get(server.url("/internal/task")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "no task"}));

    let response = client
        .post(server.url("/internal/task"))
        .json(&json!({"id": 5, "result": 1.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    drop(client);
    server.stop().await;
}

/// Test: Malformed JSON bodies
/// Given a running orchestrator
/// When bodies that are not valid JSON are posted to either endpoint
/// Then the response is 422 with a JSON error and nothing is registered
#[tokio::test]
async fn test_malformed_json_rejected() {
    let server = TestServer::start(OperationTimings::uniform(0)).await;
    let client = reqwest::Client::new();

    for path in ["/api/v1/calculate", "/internal/task"] {
        let response = client
            .post(server.url(path))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", path);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON"));
    }

    let response = client
        .post(server.url("/api/v1/calculate"))
        .json(&json!({"expr": "1+2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert!(server.coordinator.list().await.is_empty());

    drop(client);
    server.stop().await;
}

/// Test: Agent client maps statuses
/// Given a running orchestrator
/// When the agent polls an empty queue and reports an unknown task
/// Then it gets None and TaskNotFound
#[tokio::test]
async fn test_agent_status_mapping() {
    let server = TestServer::start(OperationTimings::uniform(0)).await;
    let agent = Agent::new(server.base_url()).unwrap();

    assert!(agent.fetch_task().await.unwrap().is_none());
    assert!(matches!(
        agent.submit_result(TaskId(3), 1.0).await,
        Err(Error::TaskNotFound { id }) if id == TaskId(3)
    ));

    server.coordinator.submit("8/2").await.unwrap();
    let task = agent.fetch_task().await.unwrap().unwrap();
    assert_eq!(task.arg1, 8.0);
    agent.submit_result(task.id, 4.0).await.unwrap();
    assert_eq!(
        server.coordinator.get(ExpressionId(1)).await.unwrap().result,
        Some(4.0)
    );

    drop(agent);
    server.stop().await;
}

/// Test: Remote workers reduce expressions
/// Given a running orchestrator and a pool of HTTP agents
/// When expressions are submitted
/// Then the remote workers drive them all to completion
#[tokio::test]
async fn test_remote_workers_reduce_expressions() {
    let server = TestServer::start(OperationTimings::uniform(1)).await;
    let agent = Agent::new(server.base_url()).unwrap();
    let pool = WorkerPool::new(Arc::new(agent), 3, Duration::from_millis(10));
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.run(cancel).await })
    };

    let a = server.coordinator.submit("(1+2)*(3+4)").await.unwrap();
    let b = server.coordinator.submit("100/(2+3)-1").await.unwrap();

    assert_eq!(wait_for_result(&server.coordinator, a, 500).await.result, Some(21.0));
    assert_eq!(wait_for_result(&server.coordinator, b, 500).await.result, Some(19.0));

    cancel.cancel();
    let counts = handle.await.unwrap();
    assert_eq!(counts.iter().sum::<usize>(), 6);

    server.stop().await;
}
