//! Expression data model.
//!
//! An expression is the unit of work a client submits. It owns its
//! operation tree and tracks how far the distributed reduction has gone.

use serde::{Deserialize, Serialize};

use crate::core::tree::OperationTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionId(pub u64);

impl std::fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExpressionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Expression status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionStatus {
    /// Submitted, no result folded in yet.
    #[default]
    Pending,
    /// At least one task result has been folded in.
    Running,
    /// The tree reduced to a single value.
    Completed,
}

impl std::fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionStatus::Pending => write!(f, "pending"),
            ExpressionStatus::Running => write!(f, "running"),
            ExpressionStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub id: ExpressionId,
    pub source: String,
    pub status: ExpressionStatus,
    pub tree: OperationTree,
    /// Valid only once `status` is `Completed`.
    pub result: Option<f64>,
}

impl Expression {
    /// Create an expression from a parsed tree.
    ///
    /// A tree that is already a single value (e.g. `"42"`) has nothing to
    /// distribute, so the expression starts out completed.
    pub fn new(id: ExpressionId, source: &str, tree: OperationTree) -> Self {
        let mut expression = Self {
            id,
            source: source.to_string(),
            status: ExpressionStatus::Pending,
            tree,
            result: None,
        };
        if expression.tree.is_complete() {
            expression.complete();
        }
        expression
    }

    /// Re-derive the status after a result has been folded in.
    pub fn refresh_status(&mut self) {
        if self.tree.is_complete() {
            self.complete();
        } else {
            self.status = ExpressionStatus::Running;
        }
    }

    fn complete(&mut self) {
        self.status = ExpressionStatus::Completed;
        self.result = self.tree.result();
    }

    pub fn is_finished(&self) -> bool {
        self.status == ExpressionStatus::Completed
    }

    pub fn snapshot(&self) -> ExpressionSnapshot {
        ExpressionSnapshot {
            id: self.id,
            expression: self.source.clone(),
            status: self.status,
            result: if self.is_finished() { self.result } else { None },
        }
    }
}

/// Point-in-time view of an expression handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSnapshot {
    pub id: ExpressionId,
    pub expression: String,
    pub status: ExpressionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
}
