//! Operation tree for partially evaluated expressions.
//!
//! The tree is stored as an arena: nodes live in a petgraph `StableDiGraph`
//! and edges point from an operation to its left and right operands.
//! Collapsing an operation removes its operand nodes from the arena while
//! every other node keeps its index, so indices held elsewhere (the task
//! index in the coordinator) stay valid.

use std::collections::HashMap;
use std::fmt;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::calculation;
use crate::core::task::{Operator, TaskId};
use crate::error::{Error, Result};

/// Which operand slot an edge fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A resolved numeric value.
    Value(f64),
    /// A pending binary operation. `task_id` is stamped once, when the
    /// operation is handed out as an atomic task.
    Operation {
        operator: Operator,
        task_id: Option<TaskId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationNode {
    pub kind: NodeKind,
    /// Set once a worker result has been folded into this node.
    pub resolved: bool,
}

impl OperationNode {
    fn value(value: f64) -> Self {
        Self {
            kind: NodeKind::Value(value),
            resolved: false,
        }
    }

    fn operation(operator: Operator) -> Self {
        Self {
            kind: NodeKind::Operation {
                operator,
                task_id: None,
            },
            resolved: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Value(_))
    }

    pub fn as_value(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Value(v) => Some(v),
            NodeKind::Operation { .. } => None,
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            NodeKind::Operation { operator, .. } => Some(operator),
            NodeKind::Value(_) => None,
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self.kind {
            NodeKind::Operation { task_id, .. } => task_id,
            NodeKind::Value(_) => None,
        }
    }
}

/// Builds a tree bottom-up. Only the parser constructs trees, so every
/// operation is created together with both of its operands.
#[derive(Default)]
pub(crate) struct TreeBuilder {
    graph: StableDiGraph<OperationNode, Side>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
        }
    }

    pub(crate) fn leaf(&mut self, value: f64) -> NodeIndex {
        self.graph.add_node(OperationNode::value(value))
    }

    pub(crate) fn operation(
        &mut self,
        operator: Operator,
        left: NodeIndex,
        right: NodeIndex,
    ) -> NodeIndex {
        let node = self.graph.add_node(OperationNode::operation(operator));
        self.graph.add_edge(node, left, Side::Left);
        self.graph.add_edge(node, right, Side::Right);
        node
    }

    pub(crate) fn finish(self, root: NodeIndex) -> OperationTree {
        OperationTree {
            graph: self.graph,
            root,
        }
    }
}

/// Binary operation tree owned by a single expression.
#[derive(Clone)]
pub struct OperationTree {
    graph: StableDiGraph<OperationNode, Side>,
    root: NodeIndex,
}

impl OperationTree {
    /// A tree consisting of a single resolved value.
    pub fn leaf(value: f64) -> Self {
        let mut builder = TreeBuilder::new();
        let root = builder.leaf(value);
        builder.finish(root)
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, index: NodeIndex) -> Option<&OperationNode> {
        self.graph.node_weight(index)
    }

    pub fn child(&self, index: NodeIndex, side: Side) -> Option<NodeIndex> {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .find(|edge| *edge.weight() == side)
            .map(|edge| edge.target())
    }

    pub fn left(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.child(index, Side::Left)
    }

    pub fn right(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.child(index, Side::Right)
    }

    pub fn children(&self, index: NodeIndex) -> Option<(NodeIndex, NodeIndex)> {
        Some((self.left(index)?, self.right(index)?))
    }

    /// The tree is complete once the root itself is a value.
    pub fn is_complete(&self) -> bool {
        self.node(self.root).is_some_and(OperationNode::is_leaf)
    }

    pub fn result(&self) -> Option<f64> {
        self.node(self.root).and_then(OperationNode::as_value)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of operations not yet collapsed.
    pub fn operation_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|node| !node.is_leaf())
            .count()
    }

    /// Operator and operand values of an operation whose operands are both
    /// resolved values.
    pub fn operands(&self, index: NodeIndex) -> Option<(Operator, f64, f64)> {
        let operator = self.node(index)?.operator()?;
        let (left, right) = self.children(index)?;
        let left = self.node(left)?.as_value()?;
        let right = self.node(right)?.as_value()?;
        Some((operator, left, right))
    }

    /// Operations that can be handed out now: both operands are values and
    /// no task has been stamped yet. Returned in pre-order (node, left
    /// subtree, right subtree).
    pub fn ready_operations(&self) -> Vec<NodeIndex> {
        let mut ready = Vec::new();
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let Some(node) = self.node(index) else {
                continue;
            };
            if node.is_leaf() {
                continue;
            }
            if node.task_id().is_none() && self.operands(index).is_some() {
                ready.push(index);
            }
            if let Some((left, right)) = self.children(index) {
                stack.push(right);
                stack.push(left);
            }
        }

        ready
    }

    /// Stamp a task identifier on a ready operation.
    ///
    /// # Errors
    /// Returns a validation error if the node is not a ready operation or
    /// already carries a task.
    pub fn assign_task(&mut self, index: NodeIndex, id: TaskId) -> Result<()> {
        if self.operands(index).is_none() {
            return Err(Error::Validation(format!(
                "node {} is not a ready operation",
                index.index()
            )));
        }
        match self.graph.node_weight_mut(index).map(|node| &mut node.kind) {
            Some(NodeKind::Operation { task_id, .. }) if task_id.is_none() => {
                *task_id = Some(id);
                Ok(())
            }
            _ => Err(Error::Validation(format!(
                "node {} already has a task",
                index.index()
            ))),
        }
    }

    /// Fold a task result into the operation that spawned it.
    ///
    /// The operation becomes a resolved value and its operand nodes are
    /// dropped from the arena.
    ///
    /// # Errors
    /// Returns `TaskNotFound` unless `index` is an operation carrying `id`.
    pub fn collapse(&mut self, index: NodeIndex, id: TaskId, value: f64) -> Result<()> {
        if self.node(index).and_then(OperationNode::task_id) != Some(id) {
            return Err(Error::TaskNotFound { id });
        }

        let operands: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        for operand in operands {
            self.graph.remove_node(operand);
        }

        if let Some(node) = self.graph.node_weight_mut(index) {
            node.kind = NodeKind::Value(value);
            node.resolved = true;
        }
        Ok(())
    }

    /// Evaluate the remaining tree sequentially, without tasks or delays.
    pub fn evaluate(&self) -> Result<f64> {
        // Pre-order visit; walking it backwards sees operands before parents.
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            order.push(index);
            if let Some((left, right)) = self.children(index) {
                stack.push(left);
                stack.push(right);
            }
        }

        let mut values: HashMap<NodeIndex, f64> = HashMap::with_capacity(order.len());
        for index in order.into_iter().rev() {
            let node = self
                .node(index)
                .ok_or_else(|| Error::Validation(format!("dangling node {}", index.index())))?;
            let value = match node.kind {
                NodeKind::Value(v) => v,
                NodeKind::Operation { operator, .. } => {
                    let operands = self
                        .children(index)
                        .and_then(|(l, r)| Some((*values.get(&l)?, *values.get(&r)?)));
                    let (left, right) = operands.ok_or_else(|| {
                        Error::Validation(format!("operation {} lacks operands", index.index()))
                    })?;
                    calculation::apply(left, right, operator)?
                }
            };
            values.insert(index, value);
        }

        values
            .get(&self.root)
            .copied()
            .ok_or_else(|| Error::Validation("empty tree".to_string()))
    }
}

/// Pending output while rendering a tree.
enum Piece {
    Node(NodeIndex),
    Operator(Operator),
    Text(&'static str),
}

fn push_operand(stack: &mut Vec<Piece>, index: NodeIndex, wrap: bool) {
    if wrap {
        stack.push(Piece::Text(")"));
        stack.push(Piece::Node(index));
        stack.push(Piece::Text("("));
    } else {
        stack.push(Piece::Node(index));
    }
}

impl fmt::Display for OperationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pieces are pushed right to left so they pop in reading order.
        let mut stack = vec![Piece::Node(self.root)];
        while let Some(piece) = stack.pop() {
            let index = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Operator(operator) => {
                    write!(f, " {} ", operator)?;
                    continue;
                }
                Piece::Node(index) => index,
            };
            let Some(node) = self.node(index) else {
                continue;
            };
            match node.kind {
                NodeKind::Value(v) => write!(f, "{}", v)?,
                NodeKind::Operation { operator, .. } => {
                    let Some((left, right)) = self.children(index) else {
                        write!(f, "{}", operator)?;
                        continue;
                    };
                    let wrap_left = self
                        .node(left)
                        .and_then(OperationNode::operator)
                        .is_some_and(|op| op.precedence() < operator.precedence());
                    let wrap_right = self
                        .node(right)
                        .and_then(OperationNode::operator)
                        .is_some_and(|op| op.precedence() <= operator.precedence());

                    push_operand(&mut stack, right, wrap_right);
                    stack.push(Piece::Operator(operator));
                    push_operand(&mut stack, left, wrap_left);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for OperationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTree")
            .field("expression", &self.to_string())
            .field("nodes", &self.node_count())
            .field("operations", &self.operation_count())
            .finish()
    }
}
