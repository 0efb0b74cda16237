use std::fmt;

/// Canonical instruction set. The emitted byte for each member comes from
/// the build's `OpcodeMap`; `index()` is only the canonical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Nop,
    LoadK,
    LoadNil,
    LoadTrue,
    LoadFalse,
    LoadStub,
    GetGlobal,
    SetGlobal,
    GetLocal,
    SetLocal,
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Neg,
    Len,
    Jmp,
    JmpIfNot,
    JmpIf,
    Call,
    Return,
}

impl Opcode {
    pub const COUNT: usize = 33;

    pub const ALL: [Opcode; Opcode::COUNT] = [
        Opcode::Nop,
        Opcode::LoadK,
        Opcode::LoadNil,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadStub,
        Opcode::GetGlobal,
        Opcode::SetGlobal,
        Opcode::GetLocal,
        Opcode::SetLocal,
        Opcode::Pop,
        Opcode::Dup,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::Concat,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Not,
        Opcode::Neg,
        Opcode::Len,
        Opcode::Jmp,
        Opcode::JmpIfNot,
        Opcode::JmpIf,
        Opcode::Call,
        Opcode::Return,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of 24-bit operand words following the opcode byte.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::LoadK
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::Jmp
            | Opcode::JmpIfNot
            | Opcode::JmpIf => 1,
            Opcode::Return => 2,
            Opcode::Call => 3,
            _ => 0,
        }
    }

    /// Encoded size of the instruction in bytes.
    pub fn width(self) -> usize {
        1 + self.operand_count() * super::OPERAND_WIDTH
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpIfNot | Opcode::JmpIf)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::LoadK => "LOADK",
            Opcode::LoadNil => "LOADNIL",
            Opcode::LoadTrue => "LOADTRUE",
            Opcode::LoadFalse => "LOADFALSE",
            Opcode::LoadStub => "LOADSTUB",
            Opcode::GetGlobal => "GETGLOBAL",
            Opcode::SetGlobal => "SETGLOBAL",
            Opcode::GetLocal => "GETLOCAL",
            Opcode::SetLocal => "SETLOCAL",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::Concat => "CONCAT",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::Not => "NOT",
            Opcode::Neg => "NEG",
            Opcode::Len => "LEN",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfNot => "JMPIFNOT",
            Opcode::JmpIf => "JMPIF",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
        }
    }

    pub fn from_binary(op: crate::ast::BinaryOperator) -> Option<Opcode> {
        use crate::ast::BinaryOperator as B;
        Some(match op {
            B::Add => Opcode::Add,
            B::Sub => Opcode::Sub,
            B::Mul => Opcode::Mul,
            B::Div => Opcode::Div,
            B::Mod => Opcode::Mod,
            B::Pow => Opcode::Pow,
            B::Concat => Opcode::Concat,
            B::Eq => Opcode::Eq,
            B::Ne => Opcode::Ne,
            B::Lt => Opcode::Lt,
            B::Le => Opcode::Le,
            B::Gt => Opcode::Gt,
            B::Ge => Opcode::Ge,
            // Short-circuit operators compile to jumps.
            B::And | B::Or => return None,
        })
    }

    pub fn from_unary(op: crate::ast::UnaryOperator) -> Opcode {
        use crate::ast::UnaryOperator as U;
        match op {
            U::Neg => Opcode::Neg,
            U::Not => Opcode::Not,
            U::Len => Opcode::Len,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
