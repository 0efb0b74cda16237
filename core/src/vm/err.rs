use crate::error::{ErrorKind, Level, diagnostic_error};

diagnostic_error!(
    /// A Lua-level error raised while the reference VM runs a build.
    RuntimeError,
    ErrorKind::Runtime,
    "Runtime error."
);

impl RuntimeError {
    pub fn at(pc: usize, message: impl std::fmt::Display) -> Self {
        RuntimeError::with(Level::Error, format!("{} (pc {})", message, pc), "shroud.vm.exec".into(), None, None)
    }
}
