//! Arithmetic executor used by workers.

use std::time::Duration;

use crate::core::{AtomicTask, Operator};
use crate::error::{Error, Result};

/// Apply a binary operator to two operands.
pub fn apply(a: f64, b: f64, op: Operator) -> Result<f64> {
    match op {
        Operator::Add => Ok(a + b),
        Operator::Sub => Ok(a - b),
        Operator::Mul => Ok(a * b),
        Operator::Div if b == 0.0 => Err(Error::DivisionByZero),
        Operator::Div => Ok(a / b),
    }
}

/// Execute a task, waiting its simulated cost first.
pub async fn compute(task: &AtomicTask) -> Result<f64> {
    tokio::time::sleep(Duration::from_millis(task.operation_time)).await;
    apply(task.arg1, task.arg2, task.operation)
}
