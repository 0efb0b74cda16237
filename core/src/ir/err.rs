use crate::{
    ast::AstNode,
    error::{ErrorKind, Level, diagnostic_error},
};

diagnostic_error!(
    /// A construct that parses but has no IR lowering. Builds fail closed on it.
    UnsupportedConstructError,
    ErrorKind::Unsupported,
    "Unsupported construct."
);

impl UnsupportedConstructError {
    pub fn construct(construct: &str, node: &AstNode) -> Self {
        UnsupportedConstructError::with(
            Level::Error,
            format!("'{}' is not supported by the obfuscator", construct),
            "shroud.ir.builder".into(),
            node.location.clone(),
            node.span.clone(),
        )
    }
}
