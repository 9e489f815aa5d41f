//! Worker pool tests.
//!
//! These tests run real worker pools against an in-process coordinator and
//! check that concurrent execution still produces the right values.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use calcflow::config::OperationTimings;
use calcflow::core::ExpressionStatus;
use calcflow::orchestration::{Coordinator, CoordinatorEvent, WorkerEvent, WorkerPool};

use crate::fixtures::{wait_for_result, SAMPLES};

fn spawn_pool(
    coordinator: &Coordinator,
    workers: usize,
) -> (CancellationToken, tokio::task::JoinHandle<Vec<usize>>) {
    let pool = WorkerPool::new(
        Arc::new(coordinator.clone()),
        workers,
        Duration::from_millis(5),
    );
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.run(cancel).await })
    };
    (cancel, handle)
}

/// Test: Pool reduces every sample concurrently
/// Given all samples submitted at once and four workers
/// When the pool runs
/// Then every expression completes with its value
#[tokio::test]
async fn test_pool_reduces_all_samples() {
    let coordinator = Coordinator::new(OperationTimings::uniform(0));
    let mut ids = Vec::new();
    for (source, _) in SAMPLES {
        ids.push(coordinator.submit(source).await.unwrap());
    }

    let (cancel, handle) = spawn_pool(&coordinator, 4);
    for (id, &(source, expected)) in ids.into_iter().zip(SAMPLES) {
        let snapshot = wait_for_result(&coordinator, id, 500).await;
        assert_eq!(snapshot.result, Some(expected), "{}", source);
    }
    cancel.cancel();

    let counts = handle.await.unwrap();
    assert_eq!(counts.len(), 4);
    assert_eq!(coordinator.outstanding_count().await, 0);
}

/// Test: Independent operations run in parallel
/// Given four independent 100ms multiplications under one addition tree
/// When four workers run
/// Then the first level finishes in roughly one operation time
#[tokio::test]
async fn test_independent_operations_run_in_parallel() {
    let timings = OperationTimings {
        addition_ms: 0,
        subtraction_ms: 0,
        multiplication_ms: 100,
        division_ms: 0,
    };
    let coordinator = Coordinator::new(timings);
    let id = coordinator.submit("(1*2)+(3*4)+(5*6)+(7*8)").await.unwrap();
    assert_eq!(coordinator.queued_count().await, 4);

    let start = Instant::now();
    let (cancel, handle) = spawn_pool(&coordinator, 4);
    let snapshot = wait_for_result(&coordinator, id, 500).await;
    let elapsed = start.elapsed();
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(snapshot.result, Some(100.0));
    assert!(
        elapsed < Duration::from_millis(350),
        "four workers took {:?} for one level of 100ms tasks",
        elapsed
    );
}

/// Test: Events trace the whole lifecycle
/// Given a coordinator with an event channel
/// When a pool reduces one expression
/// Then Submitted, Queued, Dispatched and Completed events arrive
#[tokio::test]
async fn test_coordinator_events_over_lifecycle() {
    let (tx, mut rx) = mpsc::channel(64);
    let coordinator = Coordinator::with_events(OperationTimings::uniform(0), tx);
    let id = coordinator.submit("(1+2)*(3+4)").await.unwrap();

    let (cancel, handle) = spawn_pool(&coordinator, 2);
    let mut queued = 0;
    let mut dispatched = 0;
    let result = loop {
        match rx.recv().await.unwrap() {
            CoordinatorEvent::ExpressionSubmitted { id: submitted } => assert_eq!(submitted, id),
            CoordinatorEvent::TaskQueued { .. } => queued += 1,
            CoordinatorEvent::TaskDispatched { .. } => dispatched += 1,
            CoordinatorEvent::ExpressionCompleted { result, .. } => break result,
        }
    };
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(result, 21.0);
    assert_eq!(queued, 3);
    assert_eq!(dispatched, 3);
}

/// Test: A failing task does not stop the pool
/// Given one expression dividing by zero and one valid expression
/// When a single worker runs
/// Then the failure is reported and the valid expression still completes
#[tokio::test]
async fn test_failure_is_isolated() {
    let coordinator = Coordinator::new(OperationTimings::uniform(0));
    let bad = coordinator.submit("1/0").await.unwrap();
    let good = coordinator.submit("6*7").await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let pool = WorkerPool::new(
        Arc::new(coordinator.clone()),
        1,
        Duration::from_millis(5),
    )
    .with_events(tx);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.run(cancel).await })
    };

    assert!(matches!(rx.recv().await, Some(WorkerEvent::TaskFailed { .. })));
    assert!(matches!(
        rx.recv().await,
        Some(WorkerEvent::TaskCompleted { result, .. }) if result == 42.0
    ));
    cancel.cancel();
    assert_eq!(handle.await.unwrap(), vec![1]);

    assert_eq!(
        coordinator.get(bad).await.unwrap().status,
        ExpressionStatus::Pending
    );
    assert_eq!(coordinator.get(good).await.unwrap().result, Some(42.0));
}
