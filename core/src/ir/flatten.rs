//! Control-flow flattening of the top-level statement list.
//!
//! Only the top level is flattened; `If`/`While` bodies keep their shape.

use super::node::{IrNode, Literal};

/// Name of the dispatch variable. It is not a valid Lua identifier, so no
/// source name can ever shadow or collide with it.
pub const STATE_VAR: &str = "$state";

/// Rewrite `Chunk([s1..sN])` into `Chunk([StateMachine { blocks 1..N }])`.
/// Block `i` runs `si` then sets the state to `i + 1`; the last block clears
/// it. Chunks with fewer than two statements are returned unchanged.
pub fn flatten(root: IrNode) -> IrNode {
    let statements = match root {
        IrNode::Chunk(statements) if statements.len() >= 2 => statements,
        other => return other,
    };

    let total = statements.len();
    let blocks = statements
        .into_iter()
        .enumerate()
        .map(|(i, statement)| {
            let index = i + 1;
            let next = if index == total {
                IrNode::Literal(Literal::Nil)
            } else {
                IrNode::integer((index + 1) as i64)
            };
            IrNode::StateBlock {
                index,
                body: vec![
                    statement,
                    IrNode::Assign { targets: vec![STATE_VAR.to_string()], values: vec![next] },
                ],
            }
        })
        .collect();

    log::debug!("flattened {} top-level statements", total);
    IrNode::Chunk(vec![IrNode::StateMachine { state_var: STATE_VAR.to_string(), blocks }])
}
