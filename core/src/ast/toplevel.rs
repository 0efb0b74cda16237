//! Facts about top-level statements that decide where a large input may be
//! cut into chunks.
//!
//! Every chunk runs as its own function, so two things do not survive a
//! cut: a top-level `local` read on the far side of it, and a `return` that
//! is meant to end the whole script. A statement is sealed when a cut right
//! after it would break either.

use std::collections::HashMap;

use super::rules::{Pair, Rule, significant};
use crate::location::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevelStatement {
    pub range: ByteRange,
    /// No chunk may end right after this statement.
    pub sealed: bool,
}

impl TopLevelStatement {
    pub fn new(range: ByteRange, sealed: bool) -> Self {
        TopLevelStatement { range, sealed }
    }
}

pub(crate) fn analyse(statements: &[Pair<'_>]) -> Vec<TopLevelStatement> {
    let count = statements.len();
    let mut last_mention: HashMap<&str, usize> = HashMap::new();
    let mut first_return = count;
    for (i, statement) in statements.iter().enumerate() {
        for pair in statement.clone().into_inner().flatten() {
            if pair.as_rule() == Rule::name {
                last_mention.insert(pair.as_str(), i);
            }
        }
        if first_return == count && can_return(statement) {
            first_return = i;
        }
    }

    // Running count of top-level locals still named by a later statement.
    let mut live = vec![0i64; count + 1];
    for (i, statement) in statements.iter().enumerate() {
        for name in declared_locals(statement) {
            match last_mention.get(name) {
                Some(&last) if last > i => {
                    live[i] += 1;
                    live[last] -= 1;
                }
                _ => {}
            }
        }
    }

    let mut open = 0;
    statements
        .iter()
        .enumerate()
        .map(|(i, statement)| {
            open += live[i];
            let span = statement.as_span();
            TopLevelStatement::new(ByteRange::new(span.start(), span.end()), open > 0 || i >= first_return)
        })
        .collect()
}

fn declared_locals<'a>(statement: &Pair<'a>) -> Vec<&'a str> {
    match statement.as_rule() {
        Rule::local_stat => significant(statement)
            .into_iter()
            .filter(|pair| pair.as_rule() == Rule::name_list)
            .flat_map(|list| list.into_inner().map(|name| name.as_str()))
            .collect(),
        Rule::local_function_stat => {
            significant(statement).into_iter().filter(|p| p.as_rule() == Rule::name).map(|p| p.as_str()).collect()
        }
        _ => Vec::new(),
    }
}

/// Whether running `pair` may leave the enclosing script. Returns inside
/// function bodies only leave that function.
fn can_return(pair: &Pair<'_>) -> bool {
    match pair.as_rule() {
        Rule::retstat => true,
        Rule::func_body => false,
        _ => pair.clone().into_inner().any(|inner| can_return(&inner)),
    }
}
