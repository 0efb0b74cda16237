use crate::location;

use super::kind::AstNodeKind;

#[derive(Clone)]
pub struct AstNode {
    id: usize,
    pub kind: AstNodeKind,
    pub location: Option<location::Location>,
    pub span: Option<location::Span>,
}

impl AstNode {
    fn create_id() -> usize {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(
        kind: AstNodeKind,
        location: Option<location::Location>,
        span: Option<location::Span>,
    ) -> Self {
        AstNode {
            id: Self::create_id(),
            kind,
            location,
            span,
        }
    }

    /// Node without position information, handy for hand-built trees.
    pub fn bare(kind: AstNodeKind) -> Self {
        Self::new(kind, None, None)
    }

    pub fn get_id(&self) -> usize {
        self.id
    }
    pub fn get_kind(&self) -> &AstNodeKind {
        &self.kind
    }
    pub fn get_location(&self) -> Option<&location::Location> {
        self.location.as_ref()
    }
    pub fn get_span(&self) -> Option<&location::Span> {
        self.span.as_ref()
    }

    /// Statements of a `Block` node; empty for any other kind.
    pub fn statements(&self) -> &[AstNode] {
        match &self.kind {
            AstNodeKind::Block { statements } => statements,
            AstNodeKind::Chunk { body } => body.statements(),
            _ => &[],
        }
    }
}

/// Structural equality: two trees are equal when their kinds match,
/// regardless of node ids or positions.
impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

use std::fmt;

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} @ {}", self.kind, loc),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Debug for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#?}", self.kind)
        } else {
            write!(f, "{:?}", self.kind)
        }
    }
}
