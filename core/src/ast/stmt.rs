//! file: core/src/ast/stmt.rs
//! description: parsing helpers for blocks and statements.
//!
//! Each helper consumes one pest pair for a statement rule and returns the
//! matching `AstNode`, attaching `Location`/`Span` through the `rules`
//! helpers. Statements the compiler cannot lower (loops other than `while`,
//! function definitions, ...) are still parsed here so the IR builder can
//! reject them with a precise position.
//!
use crate::{
    ast::{AstNode, AstNodeKind, Rule, rules, rules::Pair},
    error::ShroudResult,
    script,
};

use super::expr;

/// Parse a `block` rule into a `Block` node holding its statements in order.
pub(crate) fn parse_block_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut statements = Vec::with_capacity(inner_pairs.len());
    for next_rule in inner_pairs {
        statements.push(parse_statement_rule(next_rule, script)?);
    }
    Ok(AstNode::new(AstNodeKind::Block { statements }, location, span))
}

fn parse_statement_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    match pair.as_rule() {
        Rule::local_function_stat => parse_local_function_rule(pair, script),
        Rule::local_stat => parse_local_rule(pair, script),
        Rule::if_stat => parse_if_rule(pair, script),
        Rule::while_stat => parse_while_rule(pair, script),
        Rule::do_stat => parse_do_rule(pair, script),
        Rule::for_num_stat => parse_numeric_for_rule(pair, script),
        Rule::for_in_stat => parse_generic_for_rule(pair, script),
        Rule::repeat_stat => parse_repeat_rule(pair, script),
        Rule::function_stat => parse_function_stat_rule(pair, script),
        Rule::break_stat => Ok(AstNode::new(
            AstNodeKind::Break,
            rules::get_location_from_pair(&pair, script),
            rules::get_span_from_pair(&pair, script),
        )),
        Rule::assign_stat => parse_assign_rule(pair, script),
        Rule::call_stat => parse_call_stat_rule(pair, script),
        Rule::retstat => parse_return_rule(pair, script),
        _ => Err(rules::unexpected(
            "Unexpected statement type",
            &pair,
            "shroud.ast.stmt.parse_statement_rule",
            script,
        )),
    }
}

fn parse_local_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let names_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let names = parse_name_list(&names_pair);
    let values = match inner_pairs.pop_front() {
        Some(list) => expr::parse_expression_list_rule(list, script)?,
        None => Vec::new(),
    };
    Ok(AstNode::new(AstNodeKind::Local { names, values }, location, span))
}

fn parse_assign_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let var_list = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let exp_list = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;

    let mut targets = Vec::new();
    for var in rules::significant(&var_list) {
        let target = expr::parse_suffixed_expression_rule(var.clone(), script)?;
        if !target.kind.is_assignable() {
            return Err(rules::unexpected(
                "Cannot assign to this expression",
                &var,
                "shroud.ast.stmt.parse_assign_rule",
                script,
            ));
        }
        targets.push(target);
    }
    let values = expr::parse_expression_list_rule(exp_list, script)?;
    Ok(AstNode::new(AstNodeKind::Assignment { targets, values }, location, span))
}

fn parse_call_stat_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let suffixed = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let call = expr::parse_suffixed_expression_rule(suffixed.clone(), script)?;
    if !matches!(call.kind, AstNodeKind::Call { .. } | AstNodeKind::MethodCall { .. }) {
        return Err(rules::unexpected(
            "Expected a function call statement",
            &suffixed,
            "shroud.ast.stmt.parse_call_stat_rule",
            script,
        ));
    }
    Ok(AstNode::new(AstNodeKind::CallStatement { call: Box::new(call) }, location, span))
}

fn parse_if_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let cond = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let mut clauses = vec![(
        expr::parse_expression_rule(cond, script)?,
        parse_block_rule(body, script)?,
    )];
    let mut else_body = None;

    for next_rule in inner_pairs {
        match next_rule.as_rule() {
            Rule::elseif_clause => {
                let (mut clause, loc, sp) = rules::get_data_from_rule(&next_rule, script);
                let cond = rules::fetch_next_pair(&mut clause, &loc, &sp)?;
                let body = rules::fetch_next_pair(&mut clause, &loc, &sp)?;
                clauses.push((
                    expr::parse_expression_rule(cond, script)?,
                    parse_block_rule(body, script)?,
                ));
            }
            Rule::else_clause => {
                let (mut clause, loc, sp) = rules::get_data_from_rule(&next_rule, script);
                let body = rules::fetch_next_pair(&mut clause, &loc, &sp)?;
                else_body = Some(Box::new(parse_block_rule(body, script)?));
            }
            _ => {
                return Err(rules::unexpected(
                    "Unexpected clause in if statement",
                    &next_rule,
                    "shroud.ast.stmt.parse_if_rule",
                    script,
                ));
            }
        }
    }

    Ok(AstNode::new(AstNodeKind::If { clauses, else_body }, location, span))
}

fn parse_while_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let cond = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::While {
            condition: Box::new(expr::parse_expression_rule(cond, script)?),
            body: Box::new(parse_block_rule(body, script)?),
        },
        location,
        span,
    ))
}

fn parse_do_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::Do { body: Box::new(parse_block_rule(body, script)?) },
        location,
        span,
    ))
}

fn parse_repeat_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let cond = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::Repeat {
            body: Box::new(parse_block_rule(body, script)?),
            condition: Box::new(expr::parse_expression_rule(cond, script)?),
        },
        location,
        span,
    ))
}

fn parse_numeric_for_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let var = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let start = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let limit = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    // The step is optional, so the remaining pairs are [step, block] or [block].
    let mut step = None;
    if inner_pairs.len() > 1 {
        let step_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
        step = Some(Box::new(expr::parse_expression_rule(step_pair, script)?));
    }
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::NumericFor {
            var: var.as_str().to_string(),
            start: Box::new(expr::parse_expression_rule(start, script)?),
            limit: Box::new(expr::parse_expression_rule(limit, script)?),
            step,
            body: Box::new(parse_block_rule(body, script)?),
        },
        location,
        span,
    ))
}

fn parse_generic_for_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let names = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let iterables = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::GenericFor {
            names: parse_name_list(&names),
            iterables: expr::parse_expression_list_rule(iterables, script)?,
            body: Box::new(parse_block_rule(body, script)?),
        },
        location,
        span,
    ))
}

fn parse_local_function_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let name = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let (params, is_vararg, body) = parse_function_body_rule(body, script)?;
    Ok(AstNode::new(
        AstNodeKind::Function {
            name: Some(name.as_str().to_string()),
            is_local: true,
            params,
            is_vararg,
            body: Box::new(body),
        },
        location,
        span,
    ))
}

fn parse_function_stat_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let name = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let (params, is_vararg, body) = parse_function_body_rule(body, script)?;
    let name: String = name.as_str().split_whitespace().collect();
    Ok(AstNode::new(
        AstNodeKind::Function { name: Some(name), is_local: false, params, is_vararg, body: Box::new(body) },
        location,
        span,
    ))
}

/// Parse a `func_body` rule into `(params, is_vararg, body)`.
pub(crate) fn parse_function_body_rule(
    pair: Pair,
    script: &script::Script,
) -> ShroudResult<(Vec<String>, bool, AstNode)> {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut params = Vec::new();
    let mut is_vararg = false;
    let mut body = None;
    for next_rule in inner_pairs {
        match next_rule.as_rule() {
            Rule::param_list => {
                for param in rules::significant(&next_rule) {
                    match param.as_rule() {
                        Rule::name_list => params.extend(parse_name_list(&param)),
                        Rule::vararg => is_vararg = true,
                        _ => {}
                    }
                }
            }
            Rule::block => body = Some(parse_block_rule(next_rule, script)?),
            _ => {
                return Err(rules::unexpected(
                    "Unexpected rule in function body",
                    &next_rule,
                    "shroud.ast.stmt.parse_function_body_rule",
                    script,
                ));
            }
        }
    }
    let body = match body {
        Some(body) => body,
        None => AstNode::new(AstNodeKind::Block { statements: Vec::new() }, location, span),
    };
    Ok((params, is_vararg, body))
}

fn parse_return_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let values = match inner_pairs.pop_front() {
        Some(list) => expr::parse_expression_list_rule(list, script)?,
        None => Vec::new(),
    };
    Ok(AstNode::new(AstNodeKind::Return { values }, location, span))
}

fn parse_name_list(pair: &Pair) -> Vec<String> {
    rules::significant(pair)
        .into_iter()
        .map(|name| name.as_str().to_string())
        .collect()
}
