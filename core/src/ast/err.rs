use crate::error::{ErrorKind, diagnostic_error};

diagnostic_error!(
    /// Syntactically invalid source, carrying the offending position.
    SyntaxError,
    ErrorKind::Parse,
    "There was a syntax error in the script."
);

impl SyntaxError {
    /// Build a `SyntaxError` from a pest failure, keeping pest's line/column
    /// and its expected-token message.
    pub fn from_pest<R: pest::RuleType>(
        err: pest::error::Error<R>,
        script: &crate::script::Script,
    ) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let message = err.variant.message().to_string();
        SyntaxError::with(
            crate::error::Level::Error,
            message,
            "shroud.ast.parse".into(),
            Some(crate::location::Location::new(script.name.clone(), line, column)),
            None,
        )
    }
}
