//! FIFO queue of generated but unclaimed tasks.

use std::collections::VecDeque;

use crate::core::{AtomicTask, TaskId};

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<AtomicTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: AtomicTask) {
        self.tasks.push_back(task);
    }

    /// Remove and return the oldest task, or `None` when there is no work.
    pub fn dequeue(&mut self) -> Option<AtomicTask> {
        self.tasks.pop_front()
    }

    /// Drop a task that was resolved before anyone claimed it.
    pub fn retire(&mut self, id: TaskId) -> bool {
        match self.tasks.iter().position(|task| task.id == id) {
            Some(pos) => self.tasks.remove(pos).is_some(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
