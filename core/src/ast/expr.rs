use crate::{
    ast::{AstNode, AstNodeKind, BinaryOperator, LuaNumber, Rule, TableField, UnaryOperator, rules, rules::Pair},
    error::ShroudResult,
    script,
};

pub(crate) fn parse_expression_list_rule(
    pair: Pair,
    script: &script::Script,
) -> ShroudResult<Vec<AstNode>> {
    rules::significant(&pair)
        .into_iter()
        .map(|exp| parse_expression_rule(exp, script))
        .collect()
}

pub(crate) fn parse_expression_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let next = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    parse_operand_rule(next, script)
}

/// Dispatch on the precedence level of `pair`.
fn parse_operand_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    match pair.as_rule() {
        Rule::exp => parse_expression_rule(pair, script),
        // `and`/`or` keywords are filtered out, so the operator is implied by the level.
        Rule::or_exp => parse_left_chain_rule(pair, Some(BinaryOperator::Or), script),
        Rule::and_exp => parse_left_chain_rule(pair, Some(BinaryOperator::And), script),
        Rule::cmp_exp | Rule::add_exp | Rule::mul_exp => parse_left_chain_rule(pair, None, script),
        Rule::concat_exp => parse_concat_rule(pair, script),
        Rule::unary_exp => parse_unary_rule(pair, script),
        Rule::pow_exp => parse_pow_rule(pair, script),
        Rule::simple_exp => parse_simple_rule(pair, script),
        _ => Err(rules::unexpected(
            "Unexpected expression type",
            &pair,
            "shroud.ast.expr.parse_operand_rule",
            script,
        )),
    }
}

fn binary_operator(op_pair: &Pair, script: &script::Script) -> ShroudResult<BinaryOperator> {
    BinaryOperator::from_token(op_pair.as_str()).ok_or_else(|| {
        rules::unexpected(
            "Invalid binary operator",
            op_pair,
            "shroud.ast.expr.binary_operator",
            script,
        )
    })
}

fn parse_left_chain_rule(
    pair: Pair,
    implied: Option<BinaryOperator>,
    script: &script::Script,
) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);

    let left_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let mut node = parse_operand_rule(left_pair, script)?;

    while !inner_pairs.is_empty() {
        let op = match implied {
            Some(op) => op,
            None => {
                let op_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
                binary_operator(&op_pair, script)?
            }
        };
        let right_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
        let right_location = rules::get_location_from_pair(&right_pair, script);
        let right_node = parse_operand_rule(right_pair, script)?;

        node = AstNode::new(
            AstNodeKind::BinaryOp { left: Box::new(node), op, right: Box::new(right_node) },
            right_location,
            span.clone(),
        );
    }

    Ok(node)
}

/// `..` is right associative: `a .. b .. c` is `a .. (b .. c)`.
fn parse_concat_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut operands = Vec::new();
    for next in inner_pairs {
        if next.as_rule() != Rule::concat_op {
            operands.push(parse_operand_rule(next, script)?);
        }
    }

    let mut node = match operands.pop() {
        Some(last) => last,
        None => {
            return Err(rules::unexpected(
                "Missing operand for concatenation",
                &pair,
                "shroud.ast.expr.parse_concat_rule",
                script,
            ));
        }
    };
    while let Some(left) = operands.pop() {
        node = AstNode::new(
            AstNodeKind::BinaryOp { left: Box::new(left), op: BinaryOperator::Concat, right: Box::new(node) },
            location.clone(),
            span.clone(),
        );
    }
    Ok(node)
}

fn parse_unary_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut ops = Vec::new();
    let mut operand = None;
    for next in inner_pairs {
        match next.as_rule() {
            Rule::unary_op => {
                let op = UnaryOperator::from_token(next.as_str().trim()).ok_or_else(|| {
                    rules::unexpected(
                        "Invalid unary operator",
                        &next,
                        "shroud.ast.expr.parse_unary_rule",
                        script,
                    )
                })?;
                ops.push(op);
            }
            _ => operand = Some(parse_operand_rule(next, script)?),
        }
    }

    let mut node = match operand {
        Some(node) => node,
        None => {
            return Err(rules::unexpected(
                "Missing operand for unary operator",
                &pair,
                "shroud.ast.expr.parse_unary_rule",
                script,
            ));
        }
    };
    while let Some(op) = ops.pop() {
        node = AstNode::new(
            AstNodeKind::UnaryOp { op, expr: Box::new(node) },
            location.clone(),
            span.clone(),
        );
    }
    Ok(node)
}

fn parse_pow_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let base = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let node = parse_operand_rule(base, script)?;
    if inner_pairs.is_empty() {
        return Ok(node);
    }
    let _pow = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let exponent = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::BinaryOp {
            left: Box::new(node),
            op: BinaryOperator::Pow,
            right: Box::new(parse_operand_rule(exponent, script)?),
        },
        location,
        span,
    ))
}

fn parse_simple_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let location = rules::get_location_from_pair(&pair, script);
    let span = rules::get_span_from_pair(&pair, script);
    // Keyword literals are the only pairs here, so look at the raw inner pairs.
    let next = match pair.clone().into_inner().next() {
        Some(next) => next,
        None => {
            return Err(rules::unexpected(
                "Empty expression",
                &pair,
                "shroud.ast.expr.parse_simple_rule",
                script,
            ));
        }
    };
    let kind = match next.as_rule() {
        Rule::kw_nil => AstNodeKind::Nil,
        Rule::kw_true => AstNodeKind::Bool { value: true },
        Rule::kw_false => AstNodeKind::Bool { value: false },
        Rule::vararg => AstNodeKind::Vararg,
        Rule::number => AstNodeKind::Number { value: parse_number(&next, script)? },
        Rule::string => AstNodeKind::String { value: parse_string(&next, script)? },
        Rule::function_def => {
            let (mut inner, loc, sp) = rules::get_data_from_rule(&next, script);
            let body = rules::fetch_next_pair(&mut inner, &loc, &sp)?;
            let (params, is_vararg, body) = super::stmt::parse_function_body_rule(body, script)?;
            AstNodeKind::Function { name: None, is_local: false, params, is_vararg, body: Box::new(body) }
        }
        Rule::table_cons => return parse_table_rule(next, script),
        Rule::suffixed_exp => return parse_suffixed_expression_rule(next, script),
        _ => {
            return Err(rules::unexpected(
                "Unexpected simple expression",
                &next,
                "shroud.ast.expr.parse_simple_rule",
                script,
            ));
        }
    };
    Ok(AstNode::new(kind, location, span))
}

/// Parse a primary expression followed by any number of field, index and
/// call suffixes.
pub(crate) fn parse_suffixed_expression_rule(
    pair: Pair,
    script: &script::Script,
) -> ShroudResult<AstNode> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let primary = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let (mut primary_inner, p_loc, p_span) = rules::get_data_from_rule(&primary, script);
    let head = rules::fetch_next_pair(&mut primary_inner, &p_loc, &p_span)?;
    let mut node = match head.as_rule() {
        Rule::name => AstNode::new(
            AstNodeKind::Identifier { name: head.as_str().to_string() },
            p_loc,
            p_span,
        ),
        Rule::paren_exp => {
            let (mut paren, loc, sp) = rules::get_data_from_rule(&head, script);
            let inner = rules::fetch_next_pair(&mut paren, &loc, &sp)?;
            AstNode::new(
                AstNodeKind::Paren { expr: Box::new(parse_expression_rule(inner, script)?) },
                loc,
                sp,
            )
        }
        _ => {
            return Err(rules::unexpected(
                "Unexpected primary expression",
                &head,
                "shroud.ast.expr.parse_suffixed_expression_rule",
                script,
            ));
        }
    };

    for suffix in inner_pairs {
        let (mut suffix_inner, loc, sp) = rules::get_data_from_rule(&suffix, script);
        let kind = match suffix.as_rule() {
            Rule::field_suffix => {
                let name = rules::fetch_next_pair(&mut suffix_inner, &loc, &sp)?;
                AstNodeKind::Member { object: Box::new(node), property: name.as_str().to_string() }
            }
            Rule::index_suffix => {
                let index = rules::fetch_next_pair(&mut suffix_inner, &loc, &sp)?;
                AstNodeKind::Index {
                    object: Box::new(node),
                    index: Box::new(parse_expression_rule(index, script)?),
                }
            }
            Rule::method_call => {
                let name = rules::fetch_next_pair(&mut suffix_inner, &loc, &sp)?;
                let args = rules::fetch_next_pair(&mut suffix_inner, &loc, &sp)?;
                AstNodeKind::MethodCall {
                    object: Box::new(node),
                    method: name.as_str().to_string(),
                    args: parse_call_args_rule(args, script)?,
                }
            }
            Rule::call_args => AstNodeKind::Call {
                callee: Box::new(node),
                args: parse_call_args_rule(suffix, script)?,
            },
            _ => {
                return Err(rules::unexpected(
                    "Unexpected suffix",
                    &suffix,
                    "shroud.ast.expr.parse_suffixed_expression_rule",
                    script,
                ));
            }
        };
        node = AstNode::new(kind, loc, sp);
    }

    Ok(node)
}

fn parse_call_args_rule(pair: Pair, script: &script::Script) -> ShroudResult<Vec<AstNode>> {
    let mut inner_pairs = rules::significant(&pair);
    let Some(next) = inner_pairs.pop_front() else {
        return Ok(Vec::new());
    };
    match next.as_rule() {
        Rule::exp_list => parse_expression_list_rule(next, script),
        Rule::table_cons => Ok(vec![parse_table_rule(next, script)?]),
        Rule::string => Ok(vec![AstNode::new(
            AstNodeKind::String { value: parse_string(&next, script)? },
            rules::get_location_from_pair(&next, script),
            rules::get_span_from_pair(&next, script),
        )]),
        _ => Err(rules::unexpected(
            "Unexpected call arguments",
            &next,
            "shroud.ast.expr.parse_call_args_rule",
            script,
        )),
    }
}

fn parse_table_rule(pair: Pair, script: &script::Script) -> ShroudResult<AstNode> {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut fields = Vec::new();
    for field_list in inner_pairs {
        for field in rules::significant(&field_list) {
            let (mut inner, loc, sp) = rules::get_data_from_rule(&field, script);
            let next = rules::fetch_next_pair(&mut inner, &loc, &sp)?;
            let field = match next.as_rule() {
                Rule::keyed_field => {
                    let (mut kv, kloc, ksp) = rules::get_data_from_rule(&next, script);
                    let key = rules::fetch_next_pair(&mut kv, &kloc, &ksp)?;
                    let value = rules::fetch_next_pair(&mut kv, &kloc, &ksp)?;
                    TableField::Keyed(
                        parse_expression_rule(key, script)?,
                        parse_expression_rule(value, script)?,
                    )
                }
                Rule::named_field => {
                    let (mut kv, kloc, ksp) = rules::get_data_from_rule(&next, script);
                    let name = rules::fetch_next_pair(&mut kv, &kloc, &ksp)?;
                    let value = rules::fetch_next_pair(&mut kv, &kloc, &ksp)?;
                    TableField::Named(name.as_str().to_string(), parse_expression_rule(value, script)?)
                }
                _ => TableField::Positional(parse_expression_rule(next, script)?),
            };
            fields.push(field);
        }
    }
    Ok(AstNode::new(AstNodeKind::Table { fields }, location, span))
}

fn parse_number(pair: &Pair, script: &script::Script) -> ShroudResult<LuaNumber> {
    let text = pair.as_str();
    let invalid = || {
        rules::unexpected("Malformed number", pair, "shroud.ast.expr.parse_number", script)
    };
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        // Hex literals wrap modulo 2^64 like Lua 5.3 integers.
        let mut value: u64 = 0;
        for digit in hex.chars() {
            let d = digit.to_digit(16).ok_or_else(invalid)?;
            value = value.wrapping_mul(16).wrapping_add(d as u64);
        }
        return Ok(LuaNumber::Integer(value as i64));
    }
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().map(LuaNumber::Float).map_err(|_| invalid());
    }
    match text.parse::<i64>() {
        Ok(v) => Ok(LuaNumber::Integer(v)),
        // Too large for an integer: Lua reads it as a float.
        Err(_) => text.parse::<f64>().map(LuaNumber::Float).map_err(|_| invalid()),
    }
}

/// Decode a string literal (short with escapes, or long bracket) into bytes.
fn parse_string(pair: &Pair, script: &script::Script) -> ShroudResult<Vec<u8>> {
    let text = pair.as_str();
    let malformed = |what: &str| {
        rules::unexpected(what, pair, "shroud.ast.expr.parse_string", script)
    };

    if text.starts_with('[') {
        let level = text[1..].bytes().take_while(|b| *b == b'=').count();
        let open = level + 2;
        let close = level + 2;
        if text.len() < open + close {
            return Err(malformed("Malformed long string"));
        }
        let mut body = &text[open..text.len() - close];
        // A newline right after the opening bracket is skipped.
        if let Some(rest) = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')) {
            body = rest;
        }
        return Ok(body.as_bytes().to_vec());
    }

    let bytes = text.as_bytes();
    if bytes.len() < 2 {
        return Err(malformed("Malformed string"));
    }
    let body = &bytes[1..bytes.len() - 1];
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = body.get(i) else {
            return Err(malformed("Unfinished escape sequence"));
        };
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'v' => out.push(0x0B),
            b'\n' => out.push(b'\n'),
            b'\r' => {
                if body.get(i) == Some(&b'\n') {
                    i += 1;
                }
                out.push(b'\n');
            }
            b'x' => {
                let hex = body.get(i..i + 2).ok_or_else(|| malformed("Malformed \\x escape"))?;
                let hex = std::str::from_utf8(hex).map_err(|_| malformed("Malformed \\x escape"))?;
                let value = u8::from_str_radix(hex, 16).map_err(|_| malformed("Malformed \\x escape"))?;
                out.push(value);
                i += 2;
            }
            b'0'..=b'9' => {
                let mut value = (esc - b'0') as u32;
                let mut digits = 1;
                while digits < 3 {
                    match body.get(i) {
                        Some(d) if d.is_ascii_digit() => {
                            value = value * 10 + (d - b'0') as u32;
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if value > 255 {
                    return Err(malformed("Decimal escape too large"));
                }
                out.push(value as u8);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
