//! file: core/src/ir/builder.rs
//! description: AST -> IR lowering.
//!
//! The builder is a pure function of the AST: it owns no randomness and no
//! counters, so the same tree always lowers to the same IR. Anything the IR
//! has no case for is rejected with `UnsupportedConstructError` carrying the
//! construct name and its source position.

use crate::{
    ast::{AstNode, AstNodeKind},
    error::{ShroudErrorExt, ShroudResult},
};

use super::{
    err::UnsupportedConstructError,
    node::{IrNode, Literal},
};

pub struct IrBuilder;

impl IrBuilder {
    /// Lower a `Chunk` (or a bare `Block`) into `IrNode::Chunk`.
    pub fn build(ast: &AstNode) -> ShroudResult<IrNode> {
        let body = match &ast.kind {
            AstNodeKind::Chunk { body } => Self::lower_block(body)?,
            AstNodeKind::Block { .. } => Self::lower_block(ast)?,
            _ => vec![Self::lower_statement(ast)?],
        };
        Ok(IrNode::Chunk(body))
    }

    fn lower_block(block: &AstNode) -> ShroudResult<Vec<IrNode>> {
        match &block.kind {
            AstNodeKind::Block { statements } => statements.iter().map(Self::lower_statement).collect(),
            _ => Ok(vec![Self::lower_statement(block)?]),
        }
    }

    fn lower_statement(node: &AstNode) -> ShroudResult<IrNode> {
        match &node.kind {
            AstNodeKind::Local { names, values } => Ok(IrNode::Local {
                names: names.clone(),
                values: Self::lower_expressions(values)?,
            }),
            AstNodeKind::Assignment { targets, values } => {
                let mut names = Vec::with_capacity(targets.len());
                for target in targets {
                    match &target.kind {
                        AstNodeKind::Identifier { name } => names.push(name.clone()),
                        AstNodeKind::Member { .. } => return Err(unsupported("field assignment", target)),
                        AstNodeKind::Index { .. } => return Err(unsupported("index assignment", target)),
                        _ => return Err(unsupported("assignment target", target)),
                    }
                }
                Ok(IrNode::Assign { targets: names, values: Self::lower_expressions(values)? })
            }
            AstNodeKind::CallStatement { call } => Self::lower_expression(call),
            AstNodeKind::If { clauses, else_body } => Self::lower_if(clauses, else_body.as_deref()),
            AstNodeKind::While { condition, body } => Ok(IrNode::While {
                cond: Box::new(Self::lower_expression(condition)?),
                body: Self::lower_block(body)?,
            }),
            AstNodeKind::Return { values } => Ok(IrNode::Return(Self::lower_expressions(values)?)),
            AstNodeKind::Block { .. } => Err(unsupported("nested block", node)),
            AstNodeKind::Do { .. } => Err(unsupported("do block", node)),
            AstNodeKind::NumericFor { .. } => Err(unsupported("numeric for", node)),
            AstNodeKind::GenericFor { .. } => Err(unsupported("generic for", node)),
            AstNodeKind::Repeat { .. } => Err(unsupported("repeat", node)),
            AstNodeKind::Function { .. } => Err(unsupported("function definition", node)),
            AstNodeKind::Break => Err(unsupported("break", node)),
            _ => Err(unsupported(&format!("{} statement", node.kind), node)),
        }
    }

    /// `elseif` chains become nested `If` nodes in the else branch.
    fn lower_if(clauses: &[(AstNode, AstNode)], else_body: Option<&AstNode>) -> ShroudResult<IrNode> {
        let Some(((cond, body), rest)) = clauses.split_first() else {
            return Ok(IrNode::Chunk(Vec::new()));
        };
        let else_ir = if rest.is_empty() {
            match else_body {
                Some(body) => Some(Self::lower_block(body)?),
                None => None,
            }
        } else {
            Some(vec![Self::lower_if(rest, else_body)?])
        };
        Ok(IrNode::If {
            cond: Box::new(Self::lower_expression(cond)?),
            then_body: Self::lower_block(body)?,
            else_body: else_ir,
        })
    }

    fn lower_expressions(nodes: &[AstNode]) -> ShroudResult<Vec<IrNode>> {
        nodes.iter().map(Self::lower_expression).collect()
    }

    fn lower_expression(node: &AstNode) -> ShroudResult<IrNode> {
        match &node.kind {
            AstNodeKind::Nil => Ok(IrNode::Literal(Literal::Nil)),
            AstNodeKind::Bool { value } => Ok(IrNode::Literal(Literal::Boolean(*value))),
            AstNodeKind::Number { value } => Ok(IrNode::Literal(Literal::Number(*value))),
            AstNodeKind::String { value } => Ok(IrNode::Literal(Literal::String(value.clone()))),
            AstNodeKind::Identifier { name } => Ok(IrNode::Identifier(name.clone())),
            AstNodeKind::BinaryOp { left, op, right } => Ok(IrNode::Binary {
                op: *op,
                left: Box::new(Self::lower_expression(left)?),
                right: Box::new(Self::lower_expression(right)?),
            }),
            AstNodeKind::UnaryOp { op, expr } => Ok(IrNode::Unary {
                op: *op,
                operand: Box::new(Self::lower_expression(expr)?),
            }),
            AstNodeKind::Call { callee, args } => Ok(IrNode::Call {
                callee: Box::new(Self::lower_expression(callee)?),
                args: Self::lower_expressions(args)?,
                single_value: false,
            }),
            AstNodeKind::Paren { expr } => match Self::lower_expression(expr)? {
                IrNode::Call { callee, args, .. } => Ok(IrNode::Call { callee, args, single_value: true }),
                other => Ok(other),
            },
            AstNodeKind::Function { .. } => Err(unsupported("function definition", node)),
            AstNodeKind::Table { .. } => Err(unsupported("table constructor", node)),
            AstNodeKind::Member { .. } => Err(unsupported("field access", node)),
            AstNodeKind::Index { .. } => Err(unsupported("index access", node)),
            AstNodeKind::MethodCall { .. } => Err(unsupported("method call", node)),
            AstNodeKind::Vararg => Err(unsupported("vararg", node)),
            _ => Err(unsupported(&format!("{} expression", node.kind), node)),
        }
    }
}

fn unsupported(construct: &str, node: &AstNode) -> Box<dyn ShroudErrorExt> {
    log::debug!("rejecting {} at {:?}", construct, node.location);
    UnsupportedConstructError::construct(construct, node).boxed()
}
