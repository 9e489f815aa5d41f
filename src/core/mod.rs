//! Core domain models for expression decomposition.
//!
//! This module contains the parser, the operation tree that holds partial
//! evaluation state, and the expression and atomic task models built on it.

pub mod expression;
pub mod parser;
pub mod task;
pub mod tree;

pub use expression::{Expression, ExpressionId, ExpressionSnapshot, ExpressionStatus};
pub use parser::parse;
pub use task::{AtomicTask, IdAllocator, Operator, TaskId};
pub use tree::{NodeKind, OperationNode, OperationTree, Side};
