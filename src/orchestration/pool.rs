//! Worker pool for polling task execution.
//!
//! The `WorkerPool` runs a fixed number of workers that poll a
//! [`TaskSource`] for atomic tasks, execute them and report the results.
//! Polling cadence and backoff belong to the workers; the source never
//! blocks waiting for work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::calculation;
use crate::core::{AtomicTask, TaskId};
use crate::error::Result;
use crate::orchestration::coordinator::Coordinator;
use crate::util::sleep_or_cancelled;
use crate::{clog, clog_debug, clog_warn};

/// Where workers get tasks from and report results to.
pub trait TaskSource: Send + Sync + 'static {
    /// Claim the next task, or `None` when there is no work right now.
    fn fetch_task(&self) -> impl Future<Output = Result<Option<AtomicTask>>> + Send;

    /// Report the result of a claimed task.
    fn report_result(&self, id: TaskId, result: f64) -> impl Future<Output = Result<()>> + Send;
}

impl TaskSource for Coordinator {
    async fn fetch_task(&self) -> Result<Option<AtomicTask>> {
        Ok(self.next_task().await)
    }

    async fn report_result(&self, id: TaskId, result: f64) -> Result<()> {
        self.submit_result(id, result).await.map(|_| ())
    }
}

/// Events emitted by workers as tasks finish.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A task was executed and its result accepted.
    TaskCompleted {
        /// The worker that ran the task.
        worker: usize,
        /// The task that completed.
        task_id: TaskId,
        /// The computed value.
        result: f64,
    },
    /// A task could not be executed; it is abandoned.
    TaskFailed {
        /// The worker that ran the task.
        worker: usize,
        /// The task that failed.
        task_id: TaskId,
        /// Error message describing the failure.
        error: String,
    },
}

/// A fixed-size set of polling workers.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let pool = WorkerPool::new(Arc::new(coordinator), 4, Duration::from_millis(100));
/// let cancel = CancellationToken::new();
/// let completed = pool.run(cancel.clone()).await;
/// ```
pub struct WorkerPool<S: TaskSource> {
    source: Arc<S>,
    computing_power: usize,
    poll_interval: Duration,
    event_tx: Option<mpsc::Sender<WorkerEvent>>,
}

impl<S: TaskSource> WorkerPool<S> {
    /// Create a pool of `computing_power` workers (at least one).
    pub fn new(source: Arc<S>, computing_power: usize, poll_interval: Duration) -> Self {
        Self {
            source,
            computing_power: computing_power.max(1),
            poll_interval,
            event_tx: None,
        }
    }

    /// Publish task outcomes on `event_tx`.
    pub fn with_events(mut self, event_tx: mpsc::Sender<WorkerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn computing_power(&self) -> usize {
        self.computing_power
    }

    /// Run all workers until `cancel` fires.
    ///
    /// Returns how many tasks each worker completed, indexed by worker
    /// number minus one.
    pub async fn run(&self, cancel: CancellationToken) -> Vec<usize> {
        clog!("Starting {} workers", self.computing_power);

        let handles: Vec<_> = (1..=self.computing_power)
            .map(|worker| {
                let source = Arc::clone(&self.source);
                let event_tx = self.event_tx.clone();
                let cancel = cancel.clone();
                let poll_interval = self.poll_interval;
                tokio::spawn(async move {
                    worker_loop(worker, source, poll_interval, event_tx, cancel).await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(i, joined)| {
                joined.unwrap_or_else(|e| {
                    clog_warn!("Worker {} stopped abnormally: {}", i + 1, e);
                    0
                })
            })
            .collect()
    }
}

async fn worker_loop<S: TaskSource>(
    worker: usize,
    source: Arc<S>,
    poll_interval: Duration,
    event_tx: Option<mpsc::Sender<WorkerEvent>>,
    cancel: CancellationToken,
) -> usize {
    let mut completed = 0;

    while !cancel.is_cancelled() {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            fetched = source.fetch_task() => fetched,
        };

        let task = match fetched {
            Ok(Some(task)) => task,
            Ok(None) => {
                if sleep_or_cancelled(&cancel, poll_interval).await {
                    break;
                }
                continue;
            }
            Err(e) => {
                clog_warn!("Worker {}: failed to fetch task: {}", worker, e);
                if sleep_or_cancelled(&cancel, poll_interval).await {
                    break;
                }
                continue;
            }
        };

        clog_debug!("Worker {}: received {}", worker, task);
        let event = match calculation::compute(&task).await {
            Ok(result) => match source.report_result(task.id, result).await {
                Ok(()) => {
                    completed += 1;
                    clog_debug!("Worker {}: task {} = {}", worker, task.id, result);
                    WorkerEvent::TaskCompleted {
                        worker,
                        task_id: task.id,
                        result,
                    }
                }
                Err(e) => {
                    clog_warn!("Worker {}: failed to report task {}: {}", worker, task.id, e);
                    continue;
                }
            },
            // The task is lost to the coordinator from here on; nothing
            // reclaims it.
            Err(e) => {
                clog_warn!("Worker {}: task {} failed: {}", worker, task.id, e);
                WorkerEvent::TaskFailed {
                    worker,
                    task_id: task.id,
                    error: e.to_string(),
                }
            }
        };

        if let Some(tx) = &event_tx {
            let _ = tx.send(event).await;
        }
    }

    clog_debug!("Worker {} stopping after {} tasks", worker, completed);
    completed
}
