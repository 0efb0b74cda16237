//! file: core/src/ast/kind.rs
//! description: AST node kind definitions and operator enums.
//!
//! Defines `AstNodeKind` along with `BinaryOperator`, `UnaryOperator` and the
//! `LuaNumber` literal representation. The tree covers the whole Lua 5.1
//! surface so later stages can reject what they do not support by name.
//!
use super::node::AstNode;

/// Binary operators in Lua 5.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,    // +
    Sub,    // -
    Mul,    // *
    Div,    // /
    Mod,    // %
    Pow,    // ^
    Concat, // ..
    Eq,     // ==
    Ne,     // ~=
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=
    And,    // and
    Or,     // or
}

impl BinaryOperator {
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "%" => BinaryOperator::Mod,
            "^" => BinaryOperator::Pow,
            ".." => BinaryOperator::Concat,
            "==" => BinaryOperator::Eq,
            "~=" => BinaryOperator::Ne,
            "<" => BinaryOperator::Lt,
            "<=" => BinaryOperator::Le,
            ">" => BinaryOperator::Gt,
            ">=" => BinaryOperator::Ge,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::Concat => "..",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "~=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
}

/// Unary operators in Lua 5.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg, // -
    Not, // not
    Len, // #
}

impl UnaryOperator {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "-" => Some(UnaryOperator::Neg),
            "not" => Some(UnaryOperator::Not),
            "#" => Some(UnaryOperator::Len),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "not",
            UnaryOperator::Len => "#",
        }
    }
}

/// A numeric literal. Integer and float spellings stay distinct because
/// Lua 5.3+ prints `3` and `3.0` differently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LuaNumber {
    Integer(i64),
    Float(f64),
}

impl std::fmt::Display for LuaNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaNumber::Integer(i) => write!(f, "{}", i),
            LuaNumber::Float(x) => write!(f, "{:?}", x),
        }
    }
}

/// One field of a table constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    Positional(AstNode),
    Named(String, AstNode),
    Keyed(AstNode, AstNode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNodeKind {
    Chunk { body: Box<AstNode> },
    Block { statements: Vec<AstNode> },

    Local { names: Vec<String>, values: Vec<AstNode> },
    Assignment { targets: Vec<AstNode>, values: Vec<AstNode> },
    CallStatement { call: Box<AstNode> },

    /// `if`/`elseif` clauses in source order, then the optional `else` block.
    If { clauses: Vec<(AstNode, AstNode)>, else_body: Option<Box<AstNode>> },
    While { condition: Box<AstNode>, body: Box<AstNode> },
    Do { body: Box<AstNode> },
    NumericFor { var: String, start: Box<AstNode>, limit: Box<AstNode>, step: Option<Box<AstNode>>, body: Box<AstNode> },
    GenericFor { names: Vec<String>, iterables: Vec<AstNode>, body: Box<AstNode> },
    Repeat { body: Box<AstNode>, condition: Box<AstNode> },
    Function { name: Option<String>, is_local: bool, params: Vec<String>, is_vararg: bool, body: Box<AstNode> },
    Break,
    Return { values: Vec<AstNode> },

    UnaryOp { op: UnaryOperator, expr: Box<AstNode> },
    BinaryOp { left: Box<AstNode>, op: BinaryOperator, right: Box<AstNode> },
    Call { callee: Box<AstNode>, args: Vec<AstNode> },
    MethodCall { object: Box<AstNode>, method: String, args: Vec<AstNode> },
    Member { object: Box<AstNode>, property: String },
    Index { object: Box<AstNode>, index: Box<AstNode> },
    Paren { expr: Box<AstNode> },
    Table { fields: Vec<TableField> },

    Identifier { name: String },
    String { value: Vec<u8> },
    Number { value: LuaNumber },
    Bool { value: bool },
    Vararg,
    Nil,
}

impl AstNodeKind {
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            AstNodeKind::UnaryOp { .. }
                | AstNodeKind::BinaryOp { .. }
                | AstNodeKind::Call { .. }
                | AstNodeKind::MethodCall { .. }
                | AstNodeKind::Member { .. }
                | AstNodeKind::Index { .. }
                | AstNodeKind::Paren { .. }
                | AstNodeKind::Table { .. }
                | AstNodeKind::Identifier { .. }
                | AstNodeKind::String { .. }
                | AstNodeKind::Number { .. }
                | AstNodeKind::Bool { .. }
                | AstNodeKind::Vararg
                | AstNodeKind::Nil
        ) || matches!(self, AstNodeKind::Function { name: None, .. })
    }

    /// Whether the expression can produce more than one value when it sits
    /// last in an expression list.
    pub fn is_multi_value(&self) -> bool {
        matches!(self, AstNodeKind::Call { .. } | AstNodeKind::MethodCall { .. } | AstNodeKind::Vararg)
    }

    /// Whether the node may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(self, AstNodeKind::Identifier { .. } | AstNodeKind::Member { .. } | AstNodeKind::Index { .. })
    }
}

use std::fmt;

impl fmt::Display for AstNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNodeKind::Chunk { .. } => write!(f, "Chunk"),
            AstNodeKind::Block { .. } => write!(f, "Block"),
            AstNodeKind::Local { .. } => write!(f, "Local"),
            AstNodeKind::Assignment { .. } => write!(f, "Assignment"),
            AstNodeKind::CallStatement { .. } => write!(f, "CallStatement"),
            AstNodeKind::If { .. } => write!(f, "If"),
            AstNodeKind::While { .. } => write!(f, "While"),
            AstNodeKind::Do { .. } => write!(f, "Do"),
            AstNodeKind::NumericFor { .. } => write!(f, "NumericFor"),
            AstNodeKind::GenericFor { .. } => write!(f, "GenericFor"),
            AstNodeKind::Repeat { .. } => write!(f, "Repeat"),
            AstNodeKind::Function { .. } => write!(f, "Function"),
            AstNodeKind::Break => write!(f, "Break"),
            AstNodeKind::Return { .. } => write!(f, "Return"),
            AstNodeKind::UnaryOp { .. } => write!(f, "UnaryOp"),
            AstNodeKind::BinaryOp { .. } => write!(f, "BinaryOp"),
            AstNodeKind::Call { .. } => write!(f, "Call"),
            AstNodeKind::MethodCall { .. } => write!(f, "MethodCall"),
            AstNodeKind::Member { .. } => write!(f, "Member"),
            AstNodeKind::Index { .. } => write!(f, "Index"),
            AstNodeKind::Paren { .. } => write!(f, "Paren"),
            AstNodeKind::Table { .. } => write!(f, "Table"),
            AstNodeKind::Identifier { .. } => write!(f, "Identifier"),
            AstNodeKind::String { .. } => write!(f, "String"),
            AstNodeKind::Number { .. } => write!(f, "Number"),
            AstNodeKind::Bool { .. } => write!(f, "Bool"),
            AstNodeKind::Vararg => write!(f, "Vararg"),
            AstNodeKind::Nil => write!(f, "Nil"),
        }
    }
}
