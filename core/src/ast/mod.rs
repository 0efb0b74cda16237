//! file: core/src/ast/mod.rs
//! description: Lua source to AST.
//!
//! `parse` drives the pest-generated `RulesParser` over `grammar.pest` and
//! walks the resulting pairs into `AstNode` trees. The chunk splitter uses
//! `top_level_statements` to cut large inputs only between statements, and
//! only where the cut keeps the script's meaning.
//!
pub mod err;
pub mod kind;
pub mod node;
pub(crate) mod rules;
pub mod toplevel;

mod expr;
mod stmt;

use pest::Parser;

pub use kind::{AstNodeKind, BinaryOperator, LuaNumber, TableField, UnaryOperator};
pub use node::AstNode;
pub use rules::{Rule, RulesParser};
pub use toplevel::TopLevelStatement;

use crate::{error::ShroudResult, location::ByteRange, script::Script};

/// Parse a whole script into a `Chunk` node.
pub fn parse(script: &Script) -> ShroudResult<AstNode> {
    let block = parse_block_pair(script)?;
    let location = rules::get_location_from_pair(&block, script);
    let span = rules::get_span_from_pair(&block, script);
    let body = stmt::parse_block_rule(block, script)?;
    log::debug!("parsed {} ({} top-level statements)", script.name, body.statements().len());
    Ok(AstNode::new(AstNodeKind::Chunk { body: Box::new(body) }, location, span))
}

/// Byte range of every top-level statement, in source order. A trailing
/// `return` counts as a statement.
pub fn top_level_statement_ranges(script: &Script) -> ShroudResult<Vec<ByteRange>> {
    Ok(top_level_statements(script)?.into_iter().map(|statement| statement.range).collect())
}

/// Top-level statements with the cut constraints the chunk splitter obeys.
pub fn top_level_statements(script: &Script) -> ShroudResult<Vec<TopLevelStatement>> {
    let block = parse_block_pair(script)?;
    let statements: Vec<_> = rules::significant(&block).into_iter().collect();
    Ok(toplevel::analyse(&statements))
}

fn parse_block_pair(script: &Script) -> ShroudResult<rules::Pair<'_>> {
    let mut pairs = RulesParser::parse(Rule::chunk, &script.content)
        .map_err(|e| err::SyntaxError::from_pest(e, script).boxed())?;
    let chunk = pairs.next().ok_or_else(|| {
        err::SyntaxError::new("shroud.ast.parse".into(), None, None).boxed()
    })?;
    let (mut inner, location, span) = rules::get_data_from_rule(&chunk, script);
    let block = rules::fetch_next_pair(&mut inner, &location, &span)?;
    if block.as_rule() != Rule::block {
        return Err(rules::unexpected("Expected a block", &block, "shroud.ast.parse", script));
    }
    Ok(block)
}
