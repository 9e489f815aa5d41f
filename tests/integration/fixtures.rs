//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A synchronous coordinator harness with configurable result ordering
//! - Sample expressions with known values
//! - Spawning an orchestrator on an ephemeral port

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use calcflow::calculation;
use calcflow::config::OperationTimings;
use calcflow::core::{AtomicTask, ExpressionId, ExpressionSnapshot};
use calcflow::orchestration::{Coordinator, CoordinatorState};
use calcflow::server;

/// Expressions paired with the value ordinary arithmetic gives them.
pub const SAMPLES: &[(&str, f64)] = &[
    ("1+2*3", 7.0),
    ("(1+2)*3", 9.0),
    ("2*3+4*5", 26.0),
    ("10-4-3", 3.0),
    ("100/10/5", 2.0),
    ("(1.5+2.5)*(3-1)/4", 2.0),
    ("((((1+1)+1)+1)+1)", 5.0),
    ("1+(2+(3+(4+(5+6))))", 21.0),
    ("8/(3-1)*(2+2)-7", 9.0),
    ("42", 42.0),
];

/// Which queued task the harness hands a result back for next.
#[derive(Debug, Clone, Copy)]
pub enum Order {
    /// Oldest task first, the way pollers drain the queue.
    Fifo,
    /// Claim everything queued, then answer newest first.
    Reversed,
}

/// Drives a `CoordinatorState` without workers or a runtime.
pub struct CoordinatorHarness {
    pub state: CoordinatorState,
}

impl CoordinatorHarness {
    pub fn new() -> Self {
        Self {
            state: CoordinatorState::new(OperationTimings::uniform(0)),
        }
    }

    /// Compute a claimed task the way a worker would, without the delay.
    pub fn execute(task: &AtomicTask) -> f64 {
        calculation::apply(task.arg1, task.arg2, task.operation)
            .expect("sample expressions never divide by zero")
    }

    /// Claim and answer tasks in `order` until the queue runs dry.
    ///
    /// Returns how many results were folded back.
    pub fn drain(&mut self, order: Order) -> usize {
        let mut folded = 0;
        loop {
            let mut claimed = Vec::new();
            while let Some(task) = self.state.next_task() {
                claimed.push(task);
                if matches!(order, Order::Fifo) {
                    break;
                }
            }
            if claimed.is_empty() {
                return folded;
            }
            if matches!(order, Order::Reversed) {
                claimed.reverse();
            }
            for task in claimed {
                self.state
                    .submit_result(task.id, Self::execute(&task))
                    .expect("claimed task must be tracked");
                folded += 1;
            }
        }
    }
}

/// An orchestrator serving on `127.0.0.1` with a random port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub coordinator: Coordinator,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<calcflow::Result<()>>>,
}

impl TestServer {
    pub async fn start(timings: OperationTimings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind ephemeral port");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let coordinator = Coordinator::new(timings);
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(server::serve_with_shutdown(
            listener,
            coordinator.clone(),
            async move {
                let _ = rx.await;
            },
        ));

        Self {
            addr,
            coordinator,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .expect("server task panicked")
                .expect("server returned an error");
        }
    }
}

/// Poll `get` until the expression completes or `attempts` run out.
pub async fn wait_for_result(
    coordinator: &Coordinator,
    id: ExpressionId,
    attempts: usize,
) -> ExpressionSnapshot {
    for _ in 0..attempts {
        let snapshot = coordinator.get(id).await.expect("expression must exist");
        if snapshot.result.is_some() {
            return snapshot;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("expression {} did not complete", id);
}
