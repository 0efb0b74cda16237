//! file: core/src/ir/node.rs
//! description: the closed IR tree the bytecode compiler walks.

use std::fmt;

use crate::ast::{BinaryOperator, LuaNumber, UnaryOperator};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(LuaNumber),
    String(Vec<u8>),
    Boolean(bool),
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrNode {
    Chunk(Vec<IrNode>),
    /// Assignment to plain names; each resolves to a local slot or a global.
    Assign { targets: Vec<String>, values: Vec<IrNode> },
    Local { names: Vec<String>, values: Vec<IrNode> },
    /// `single_value` marks a parenthesised call, which always yields exactly
    /// one value even in a multi-value position.
    Call { callee: Box<IrNode>, args: Vec<IrNode>, single_value: bool },
    Literal(Literal),
    Identifier(String),
    Binary { op: BinaryOperator, left: Box<IrNode>, right: Box<IrNode> },
    Unary { op: UnaryOperator, operand: Box<IrNode> },
    If { cond: Box<IrNode>, then_body: Vec<IrNode>, else_body: Option<Vec<IrNode>> },
    While { cond: Box<IrNode>, body: Vec<IrNode> },
    Return(Vec<IrNode>),
    StateBlock { index: usize, body: Vec<IrNode> },
    StateMachine { state_var: String, blocks: Vec<IrNode> },
}

impl IrNode {
    pub fn nil() -> Self {
        IrNode::Literal(Literal::Nil)
    }

    pub fn integer(v: i64) -> Self {
        IrNode::Literal(Literal::Number(LuaNumber::Integer(v)))
    }

    pub fn string(s: impl AsRef<[u8]>) -> Self {
        IrNode::Literal(Literal::String(s.as_ref().to_vec()))
    }

    /// Whether the node can expand to several values at the end of a list.
    pub fn is_multi_value(&self) -> bool {
        matches!(self, IrNode::Call { single_value: false, .. })
    }

    /// Statements of a `Chunk`; empty for every other kind.
    pub fn statements(&self) -> &[IrNode] {
        match self {
            IrNode::Chunk(statements) => statements,
            _ => &[],
        }
    }

    /// Total number of nodes in the tree, used by the metrics report.
    pub fn size(&self) -> usize {
        let list = |nodes: &[IrNode]| nodes.iter().map(IrNode::size).sum::<usize>();
        1 + match self {
            IrNode::Chunk(body) | IrNode::Return(body) => list(body),
            IrNode::Assign { values, .. } | IrNode::Local { values, .. } => list(values),
            IrNode::Call { callee, args, .. } => callee.size() + list(args),
            IrNode::Literal(_) | IrNode::Identifier(_) => 0,
            IrNode::Binary { left, right, .. } => left.size() + right.size(),
            IrNode::Unary { operand, .. } => operand.size(),
            IrNode::If { cond, then_body, else_body } => {
                cond.size() + list(then_body) + else_body.as_deref().map_or(0, list)
            }
            IrNode::While { cond, body } => cond.size() + list(body),
            IrNode::StateBlock { body, .. } => list(body),
            IrNode::StateMachine { blocks, .. } => list(blocks),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[IrNode], depth: usize) -> fmt::Result {
    for node in nodes {
        write_node(f, node, depth)?;
    }
    Ok(())
}

fn write_inline(nodes: &[IrNode]) -> String {
    nodes.iter().map(inline).collect::<Vec<_>>().join(", ")
}

/// Expressions print on one line.
fn inline(node: &IrNode) -> String {
    match node {
        IrNode::Literal(lit) => lit.to_string(),
        IrNode::Identifier(name) => name.clone(),
        IrNode::Binary { op, left, right } => {
            format!("({} {} {})", inline(left), op.symbol(), inline(right))
        }
        IrNode::Unary { op, operand } => format!("({} {})", op.symbol(), inline(operand)),
        IrNode::Call { callee, args, single_value } => {
            let call = format!("{}({})", inline(callee), write_inline(args));
            if *single_value { format!("({})", call) } else { call }
        }
        other => format!("<{}>", other.kind_name()),
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &IrNode, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    match node {
        IrNode::Chunk(body) => {
            writeln!(f, "{}Chunk", pad)?;
            write_list(f, body, depth + 1)
        }
        IrNode::Assign { targets, values } => {
            writeln!(f, "{}Assign {} = {}", pad, targets.join(", "), write_inline(values))
        }
        IrNode::Local { names, values } => {
            if values.is_empty() {
                writeln!(f, "{}Local {}", pad, names.join(", "))
            } else {
                writeln!(f, "{}Local {} = {}", pad, names.join(", "), write_inline(values))
            }
        }
        IrNode::Return(values) => writeln!(f, "{}Return {}", pad, write_inline(values)),
        IrNode::If { cond, then_body, else_body } => {
            writeln!(f, "{}If {}", pad, inline(cond))?;
            write_list(f, then_body, depth + 1)?;
            if let Some(else_body) = else_body {
                writeln!(f, "{}Else", pad)?;
                write_list(f, else_body, depth + 1)?;
            }
            Ok(())
        }
        IrNode::While { cond, body } => {
            writeln!(f, "{}While {}", pad, inline(cond))?;
            write_list(f, body, depth + 1)
        }
        IrNode::StateBlock { index, body } => {
            writeln!(f, "{}StateBlock #{}", pad, index)?;
            write_list(f, body, depth + 1)
        }
        IrNode::StateMachine { state_var, blocks } => {
            writeln!(f, "{}StateMachine {}", pad, state_var)?;
            write_list(f, blocks, depth + 1)
        }
        expr => writeln!(f, "{}{}", pad, inline(expr)),
    }
}

impl IrNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            IrNode::Chunk(_) => "Chunk",
            IrNode::Assign { .. } => "Assign",
            IrNode::Local { .. } => "Local",
            IrNode::Call { .. } => "Call",
            IrNode::Literal(_) => "Literal",
            IrNode::Identifier(_) => "Identifier",
            IrNode::Binary { .. } => "Binary",
            IrNode::Unary { .. } => "Unary",
            IrNode::If { .. } => "If",
            IrNode::While { .. } => "While",
            IrNode::Return(_) => "Return",
            IrNode::StateBlock { .. } => "StateBlock",
            IrNode::StateMachine { .. } => "StateMachine",
        }
    }
}

impl fmt::Display for IrNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, self, 0)
    }
}
