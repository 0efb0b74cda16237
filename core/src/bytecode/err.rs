use crate::error::{ErrorKind, Level, diagnostic_error};

use super::Opcode;

diagnostic_error!(
    /// Internal compiler defect: an unresolved jump, or an operand that does
    /// not fit. No bytecode is returned alongside it.
    CompileError,
    ErrorKind::Compile,
    "Internal compiler error."
);

impl CompileError {
    pub fn at(opcode: Opcode, position: usize, message: impl std::fmt::Display) -> Self {
        CompileError::with(
            Level::Critical,
            format!("{} at byte {}: {}", opcode, position, message),
            "shroud.bytecode.compiler".into(),
            None,
            None,
        )
    }
}
