//! Task generation for operation trees.
//!
//! The generator scans a tree for operations whose operands are both
//! resolved values and stamps each one with a fresh atomic task. A stamped
//! operation is never handed out again, so running the generator after
//! every folded result is how reduction makes progress.

use petgraph::stable_graph::NodeIndex;

use crate::config::OperationTimings;
use crate::core::{AtomicTask, IdAllocator, OperationTree, TaskId};
use crate::error::{Error, Result};

/// Stamp every ready operation in `tree` with a new task.
///
/// Tasks are returned in pre-order of the operations that spawned them,
/// paired with the node each one belongs to.
pub fn generate_tasks(
    tree: &mut OperationTree,
    task_ids: &mut IdAllocator,
    timings: &OperationTimings,
) -> Result<Vec<(NodeIndex, AtomicTask)>> {
    let mut generated = Vec::new();

    for index in tree.ready_operations() {
        let (operator, left, right) = tree.operands(index).ok_or_else(|| {
            Error::Validation(format!("node {} has unresolved operands", index.index()))
        })?;
        let id = TaskId(task_ids.next_id());
        tree.assign_task(index, id)?;
        generated.push((
            index,
            AtomicTask::new(id, left, right, operator, timings.for_operator(operator)),
        ));
    }

    Ok(generated)
}
