//! Orchestration layer for distributed expression reduction.
//!
//! This module holds the coordinator that owns expressions and the task
//! queue, the generator that turns ready operations into atomic tasks, and
//! the worker pool that executes them.

mod coordinator;
mod generator;
mod pool;
mod queue;

pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorState};
pub use generator::generate_tasks;
pub use pool::{TaskSource, WorkerEvent, WorkerPool};
pub use queue::TaskQueue;
