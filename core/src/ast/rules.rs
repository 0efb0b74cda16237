use pest_derive::Parser;

use crate::{error::ShroudErrorExt, location, script::Script};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct RulesParser;

pub(crate) type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Keyword tokens are kept as pairs by the grammar; walkers skip them.
pub(crate) fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_and
            | Rule::kw_break
            | Rule::kw_do
            | Rule::kw_else
            | Rule::kw_elseif
            | Rule::kw_end
            | Rule::kw_false
            | Rule::kw_for
            | Rule::kw_function
            | Rule::kw_if
            | Rule::kw_in
            | Rule::kw_local
            | Rule::kw_nil
            | Rule::kw_not
            | Rule::kw_or
            | Rule::kw_repeat
            | Rule::kw_return
            | Rule::kw_then
            | Rule::kw_true
            | Rule::kw_until
            | Rule::kw_while
    )
}

/// Inner pairs of `rule` with keyword tokens filtered out.
pub(crate) fn significant<'a>(rule: &Pair<'a>) -> std::collections::VecDeque<Pair<'a>> {
    rule.clone().into_inner().filter(|p| !is_keyword(p.as_rule())).collect()
}

pub(crate) fn fetch_next_pair<'a>(
    pairs: &mut std::collections::VecDeque<Pair<'a>>,
    location: &Option<location::Location>,
    span: &Option<location::Span>,
) -> Result<Pair<'a>, Box<dyn ShroudErrorExt>> {
    match pairs.pop_front() {
        Some(pair) => Ok(pair),
        None => Err(crate::ast::err::SyntaxError::with(
            crate::error::Level::Error,
            "Expected more inner pairs but found none.".into(),
            "shroud.ast.rules.fetch_next_pair".into(),
            location.clone(),
            span.clone(),
        )
        .boxed()),
    }
}

pub(crate) fn get_data_from_rule<'a>(
    rule: &Pair<'a>,
    script: &Script,
) -> (
    std::collections::VecDeque<Pair<'a>>,
    Option<location::Location>,
    Option<location::Span>,
) {
    let inner_rules = significant(rule);
    let span = get_span_from_pair(rule, script);
    let location = get_location_from_pair(rule, script);
    (inner_rules, location, span)
}

pub fn get_location_from_pair(rule: &Pair, script: &Script) -> Option<location::Location> {
    let (line, column) = script.line_col(rule.as_span().start());
    Some(location::Location::new(script.name.clone(), line, column))
}

pub fn get_span_from_pair(rule: &Pair, script: &Script) -> Option<location::Span> {
    let span = rule.as_span();
    let (start_line, start_col) = script.line_col(span.start());
    let (end_line, end_col) = script.line_col(span.end());
    Some(location::Span::new(
        location::Location::new(script.name.clone(), start_line, start_col),
        location::Location::new(script.name.clone(), end_line, end_col),
    ))
}

pub(crate) fn unexpected(
    what: &str,
    pair: &Pair,
    issuer: &str,
    script: &Script,
) -> Box<dyn ShroudErrorExt> {
    crate::ast::err::SyntaxError::with(
        crate::error::Level::Error,
        format!("{}: {:?}", what, pair.as_rule()),
        issuer.into(),
        get_location_from_pair(pair, script),
        get_span_from_pair(pair, script),
    )
    .boxed()
}
