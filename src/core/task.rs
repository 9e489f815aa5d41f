//! Atomic task data model.
//!
//! An atomic task is one fully specified binary operation, two numeric
//! operands and an operator, that a worker can execute on its own.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Identifier of an atomic task, unique for the lifetime of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Monotonic counter handing out identifiers starting at 1.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Return the next identifier and advance the counter.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Peek at the identifier the next call will return.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary arithmetic operator.
///
/// Serialized as its symbol (`"+"`, `"-"`, `"*"`, `"/"`) so tasks keep
/// the wire shape workers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next().and_then(Operator::from_char), chars.next()) {
            (Some(op), None) => Ok(op),
            _ => Err(Error::UnsupportedOperation(s.to_string())),
        }
    }
}

/// A dispatchable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicTask {
    pub id: TaskId,
    pub arg1: f64,
    pub arg2: f64,
    pub operation: Operator,
    /// Simulated execution cost in milliseconds.
    pub operation_time: u64,
}

impl AtomicTask {
    pub fn new(id: TaskId, arg1: f64, arg2: f64, operation: Operator, operation_time: u64) -> Self {
        Self {
            id,
            arg1,
            arg2,
            operation,
            operation_time,
        }
    }
}

impl std::fmt::Display for AtomicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "task {}: {} {} {}",
            self.id, self.arg1, self.operation, self.arg2
        )
    }
}
