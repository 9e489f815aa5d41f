//! Coordinator for distributed expression reduction.
//!
//! The coordinator owns every in-flight expression, the task queue and the
//! identifier counters. All of it sits behind one exclusive lock; every
//! public operation holds the lock for its whole critical section,
//! including tree traversal, so operations are strictly serialized.
//!
//! No operation waits for work to appear. An empty queue and an unknown
//! expression are immediate answers.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::stable_graph::NodeIndex;
use tokio::sync::{mpsc, Mutex};

use crate::config::OperationTimings;
use crate::core::{
    parse, AtomicTask, Expression, ExpressionId, ExpressionSnapshot, ExpressionStatus,
    IdAllocator, TaskId,
};
use crate::error::{Error, Result};
use crate::orchestration::generator::generate_tasks;
use crate::orchestration::queue::TaskQueue;
use crate::{clog, clog_debug, clog_trace};

/// Events emitted by the coordinator as expressions make progress.
///
/// Delivery is best effort: events are published with `try_send` while the
/// lock is held, and dropped if the channel is full or closed.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// An expression was parsed and accepted.
    ExpressionSubmitted {
        /// The new expression.
        id: ExpressionId,
    },
    /// A task was generated and appended to the queue.
    TaskQueued {
        /// The queued task.
        task_id: TaskId,
        /// The expression the task belongs to.
        expression_id: ExpressionId,
    },
    /// A poller claimed a task.
    TaskDispatched {
        /// The claimed task.
        task_id: TaskId,
    },
    /// An expression reduced to a single value.
    ExpressionCompleted {
        /// The completed expression.
        id: ExpressionId,
        /// Its final value.
        result: f64,
    },
}

/// Where the operation that spawned a task lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskLocation {
    expression: ExpressionId,
    node: NodeIndex,
}

/// Shared state guarded by the coordinator lock.
///
/// Kept separate from [`Coordinator`] so the reduction logic can be driven
/// and tested synchronously.
pub struct CoordinatorState {
    expressions: HashMap<ExpressionId, Expression>,
    queue: TaskQueue,
    /// Outstanding tasks, maintained alongside the trees: inserted when a
    /// task is stamped, removed when its node collapses.
    task_index: HashMap<TaskId, TaskLocation>,
    expression_ids: IdAllocator,
    task_ids: IdAllocator,
    timings: OperationTimings,
    events: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl CoordinatorState {
    pub fn new(timings: OperationTimings) -> Self {
        Self {
            expressions: HashMap::new(),
            queue: TaskQueue::new(),
            task_index: HashMap::new(),
            expression_ids: IdAllocator::new(),
            task_ids: IdAllocator::new(),
            timings,
            events: None,
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    /// Parse and register an expression, queueing its first tasks.
    ///
    /// # Errors
    /// Returns `Error::Parse` if the source is malformed; nothing is
    /// registered in that case.
    pub fn submit(&mut self, source: &str) -> Result<ExpressionId> {
        let tree = parse(source)?;
        let id = ExpressionId(self.expression_ids.next_id());
        let expression = Expression::new(id, source, tree);
        let completed = expression.result.filter(|_| expression.is_finished());
        self.expressions.insert(id, expression);

        clog!("Expression {} submitted: {}", id, source);
        self.emit(CoordinatorEvent::ExpressionSubmitted { id });
        if let Some(result) = completed {
            self.emit(CoordinatorEvent::ExpressionCompleted { id, result });
        }

        self.generate_tasks(id)?;
        Ok(id)
    }

    /// Run the task generator over one expression's tree.
    ///
    /// Returns the number of tasks queued. Operations that already carry a
    /// task are skipped, so repeated calls on an unchanged tree queue
    /// nothing.
    pub fn generate_tasks(&mut self, id: ExpressionId) -> Result<usize> {
        let expression = self
            .expressions
            .get_mut(&id)
            .ok_or(Error::ExpressionNotFound { id })?;
        let generated = generate_tasks(&mut expression.tree, &mut self.task_ids, &self.timings)?;

        let count = generated.len();
        for (node, task) in generated {
            clog_debug!("Queued {} for expression {}", task, id);
            self.task_index.insert(
                task.id,
                TaskLocation {
                    expression: id,
                    node,
                },
            );
            self.emit(CoordinatorEvent::TaskQueued {
                task_id: task.id,
                expression_id: id,
            });
            self.queue.enqueue(task);
        }
        Ok(count)
    }

    /// Snapshot of every known expression, ordered by id.
    pub fn list(&self) -> Vec<ExpressionSnapshot> {
        let mut snapshots: Vec<ExpressionSnapshot> =
            self.expressions.values().map(Expression::snapshot).collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    pub fn get(&self, id: ExpressionId) -> Result<ExpressionSnapshot> {
        self.expressions
            .get(&id)
            .map(Expression::snapshot)
            .ok_or(Error::ExpressionNotFound { id })
    }

    /// Hand out the oldest queued task, if any.
    pub fn next_task(&mut self) -> Option<AtomicTask> {
        let task = self.queue.dequeue()?;
        clog_debug!("Dispatched {}", task);
        self.emit(CoordinatorEvent::TaskDispatched { task_id: task.id });
        Some(task)
    }

    /// Fold a worker result into the tree that spawned the task.
    ///
    /// The spawning operation collapses into a value, newly ready parents
    /// are queued, and the owning expression's status is re-derived.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if no tracked expression has an outstanding
    /// task with this id. State is unchanged in that case.
    pub fn submit_result(&mut self, task_id: TaskId, value: f64) -> Result<ExpressionStatus> {
        let location = *self
            .task_index
            .get(&task_id)
            .ok_or(Error::TaskNotFound { id: task_id })?;
        let expression = self
            .expressions
            .get_mut(&location.expression)
            .ok_or(Error::TaskNotFound { id: task_id })?;

        expression.tree.collapse(location.node, task_id, value)?;
        self.task_index.remove(&task_id);
        self.queue.retire(task_id);
        clog_debug!(
            "Folded task {} = {} into expression {}",
            task_id,
            value,
            location.expression
        );

        self.generate_tasks(location.expression)?;

        let expression = self
            .expressions
            .get_mut(&location.expression)
            .ok_or(Error::ExpressionNotFound {
                id: location.expression,
            })?;
        expression.refresh_status();
        clog_trace!("Expression {} tree: {}", expression.id, expression.tree);
        let status = expression.status;
        let id = expression.id;
        let result = expression.result;

        if let (ExpressionStatus::Completed, Some(result)) = (status, result) {
            clog!("Expression {} completed: {}", id, result);
            self.emit(CoordinatorEvent::ExpressionCompleted { id, result });
        }
        Ok(status)
    }

    /// Number of tasks waiting to be claimed.
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of tasks generated but not yet folded back (queued or claimed).
    pub fn outstanding_count(&self) -> usize {
        self.task_index.len()
    }

    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new(OperationTimings::default())
    }
}

/// Cloneable handle to the coordinator state.
///
/// # Example
///
/// ```ignore
/// use calcflow::orchestration::Coordinator;
///
/// let coordinator = Coordinator::new(OperationTimings::default());
/// let id = coordinator.submit("1+2*3").await?;
/// let task = coordinator.next_task().await; // 2 * 3
/// ```
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

impl Coordinator {
    pub fn new(timings: OperationTimings) -> Self {
        Self::from_state(CoordinatorState::new(timings))
    }

    /// Create a coordinator that publishes progress on `event_tx`.
    pub fn with_events(timings: OperationTimings, event_tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        let mut state = CoordinatorState::new(timings);
        state.events = Some(event_tx);
        Self::from_state(state)
    }

    fn from_state(state: CoordinatorState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn submit(&self, source: &str) -> Result<ExpressionId> {
        self.state.lock().await.submit(source)
    }

    pub async fn list(&self) -> Vec<ExpressionSnapshot> {
        self.state.lock().await.list()
    }

    pub async fn get(&self, id: ExpressionId) -> Result<ExpressionSnapshot> {
        self.state.lock().await.get(id)
    }

    pub async fn next_task(&self) -> Option<AtomicTask> {
        self.state.lock().await.next_task()
    }

    pub async fn submit_result(&self, task_id: TaskId, value: f64) -> Result<ExpressionStatus> {
        self.state.lock().await.submit_result(task_id, value)
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queued_count()
    }

    pub async fn outstanding_count(&self) -> usize {
        self.state.lock().await.outstanding_count()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(OperationTimings::default())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
