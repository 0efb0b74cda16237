use std::fmt;

use crate::location::{Location, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level_str = match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        write!(f, "{}", level_str)
    }
}

/// Coarse classification used by callers that must tell a cancelled job
/// apart from a failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Unsupported,
    Compile,
    Cancelled,
    ChunkProcessing,
    Config,
    Io,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Compile => "compile",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ChunkProcessing => "chunk",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Runtime => "runtime",
        };
        write!(f, "{}", s)
    }
}

/// Common surface of every error Shroud reports. Errors cross worker
/// threads, hence the `Send + Sync` bound.
pub trait ShroudErrorExt: Send + Sync {
    fn level(&self) -> Level;
    fn kind(&self) -> ErrorKind;
    fn message(&self) -> String;
    fn issuer(&self) -> String;
    fn span(&self) -> Option<Span>;
    fn location(&self) -> Option<Location>;
}

pub type ShroudResult<T> = Result<T, Box<dyn ShroudErrorExt>>;

impl fmt::Debug for dyn ShroudErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc_str = match self.location() {
            Some(loc) => format!("{}:{}:{}", loc.file, loc.line, loc.column),
            None => "unknown".to_string(),
        };
        let span_str = match self.span() {
            Some(span) => span.to_string(),
            None => "span:none".to_string(),
        };

        write!(
            f,
            "SHROUD | {} | {} | {} | {} | {} | {}",
            self.level(),
            self.kind(),
            loc_str,
            self.issuer(),
            span_str,
            self.message()
        )
    }
}

impl fmt::Display for dyn ShroudErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Declares a plain diagnostic error struct carrying level, message, issuer
/// and optional position, and wires it into `ShroudErrorExt`.
macro_rules! diagnostic_error {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $default_message:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            level: $crate::error::Level,
            message: String,
            issuer: String,
            location: Option<$crate::location::Location>,
            span: Option<$crate::location::Span>,
        }

        impl $name {
            pub fn new(
                issuer: String,
                location: Option<$crate::location::Location>,
                span: Option<$crate::location::Span>,
            ) -> Self {
                $name {
                    level: $crate::error::Level::Error,
                    message: $default_message.to_string(),
                    issuer,
                    location,
                    span,
                }
            }

            pub fn with(
                level: $crate::error::Level,
                message: String,
                issuer: String,
                location: Option<$crate::location::Location>,
                span: Option<$crate::location::Span>,
            ) -> Self {
                $name { level, message, issuer, location, span }
            }

            pub fn boxed(self) -> Box<dyn $crate::error::ShroudErrorExt> {
                Box::new(self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if let Some(loc) = &self.location {
                    write!(f, "{} (at {}:{}:{})", self.message, loc.file, loc.line, loc.column)
                } else {
                    write!(f, "{}", self.message)
                }
            }
        }

        impl std::error::Error for $name {}

        impl $crate::error::ShroudErrorExt for $name {
            fn level(&self) -> $crate::error::Level {
                self.level
            }

            fn kind(&self) -> $crate::error::ErrorKind {
                $kind
            }

            fn message(&self) -> String {
                self.message.clone()
            }

            fn issuer(&self) -> String {
                self.issuer.clone()
            }

            fn span(&self) -> Option<$crate::location::Span> {
                self.span.clone()
            }

            fn location(&self) -> Option<$crate::location::Location> {
                self.location.clone()
            }
        }
    };
}

pub(crate) use diagnostic_error;

diagnostic_error!(
    /// Options that cannot drive a build (density out of range, no workers).
    ConfigError,
    ErrorKind::Config,
    "Invalid obfuscation options."
);

diagnostic_error!(
    /// Reading or writing a file outside the script loader failed.
    IoError,
    ErrorKind::Io,
    "I/O failure."
);

impl IoError {
    pub fn at(path: &std::path::Path, error: &std::io::Error) -> Self {
        IoError::with(Level::Error, format!("{}: {}", path.display(), error), "shroud.io".into(), None, None)
    }
}
