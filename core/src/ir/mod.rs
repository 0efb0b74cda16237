pub mod builder;
pub mod err;
pub mod flatten;
pub mod node;

pub use self::builder::IrBuilder;
pub use self::node::{IrNode, Literal};

use crate::{ast::AstNode, error::ShroudResult};

/// Lower an AST into IR, flattening the top level when asked to.
pub fn lower_ast_to_ir(ast: &AstNode, flatten_control_flow: bool) -> ShroudResult<IrNode> {
    let ir = IrBuilder::build(ast)?;
    if flatten_control_flow {
        Ok(flatten::flatten(ir))
    } else {
        Ok(ir)
    }
}
