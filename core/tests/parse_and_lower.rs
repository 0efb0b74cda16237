use shroud_core::{
    ast,
    error::ErrorKind,
    ir::{self, IrNode, Literal, flatten::STATE_VAR},
    script::Script,
};

fn lower(src: &str, flatten: bool) -> IrNode {
    let script = Script::from_source("test.lua", src);
    let tree = ast::parse(&script).expect("parse");
    ir::lower_ast_to_ir(&tree, flatten).expect("lower")
}

#[test]
fn parses_supported_statements() {
    let src = r#"
-- comment
local a, b = 1, 2.5
c = a + b * 2
print("hi", 'there', [[long]])
if a < b then print(a) elseif a == b then print(b) else print(c) end
while c > 0 do c = c - 1 end
return a, b
"#;
    let ir = lower(src, false);
    let statements = ir.statements();
    assert_eq!(statements.len(), 6);
    assert!(matches!(statements[0], IrNode::Local { .. }));
    assert!(matches!(statements[1], IrNode::Assign { .. }));
    assert!(matches!(statements[2], IrNode::Call { .. }));
    assert!(matches!(statements[3], IrNode::If { .. }));
    assert!(matches!(statements[4], IrNode::While { .. }));
    assert!(matches!(statements[5], IrNode::Return(_)));
}

#[test]
fn elseif_chain_nests_in_else_branch() {
    let ir = lower("if a then x = 1 elseif b then x = 2 else x = 3 end", false);
    let IrNode::If { else_body: Some(else_body), .. } = &ir.statements()[0] else {
        panic!("expected If, got {}", ir);
    };
    assert_eq!(else_body.len(), 1);
    assert!(matches!(else_body[0], IrNode::If { else_body: Some(_), .. }));
}

#[test]
fn string_escapes_decode_to_bytes() {
    let ir = lower(r#"x = "a\tb\65\x42\"" "#, false);
    let IrNode::Assign { values, .. } = &ir.statements()[0] else {
        panic!("expected Assign");
    };
    assert_eq!(values[0], IrNode::Literal(Literal::String(b"a\tbAB\"".to_vec())));
}

#[test]
fn syntax_error_carries_position() {
    let script = Script::from_source("broken.lua", "local a = 1\nx = = 2\n");
    let err = ast::parse(&script).err().expect("syntax error expected");
    assert_eq!(err.kind(), ErrorKind::Parse);
    let loc = err.location().expect("location");
    assert_eq!(loc.file, "broken.lua");
    assert_eq!(loc.line, 2);
}

#[test]
fn unsupported_constructs_fail_closed() {
    let cases = [
        ("for i = 1, 3 do print(i) end", "numeric for"),
        ("for k, v in pairs(t) do end", "generic for"),
        ("repeat x = 1 until x", "repeat"),
        ("local function f() end", "function definition"),
        ("t = {}", "table constructor"),
        ("x = t.field", "field access"),
        ("t.x = 1", "field assignment"),
        ("s:upper()", "method call"),
        ("do x = 1 end", "do block"),
        ("while true do break end", "break"),
    ];
    for (src, construct) in cases {
        let script = Script::from_source("unsupported.lua", src);
        let tree = ast::parse(&script).expect("parse");
        let err = ir::lower_ast_to_ir(&tree, false).err().unwrap_or_else(|| panic!("{} should be rejected", src));
        assert_eq!(err.kind(), ErrorKind::Unsupported, "{}", src);
        assert!(err.message().contains(construct), "{}: {}", src, err.message());
        assert!(err.location().is_some(), "{}", src);
    }
}

#[test]
fn lowering_is_deterministic() {
    let src = "local a = 1\nif a then print(a .. 'x') else b = not a end\nwhile a < 3 do a = a + 1 end";
    let first = lower(src, false);
    let second = lower(src, false);
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(lower(src, true), lower(src, true));
}

#[test]
fn flattening_builds_numbered_state_blocks() {
    let ir = lower("a = 1\nb = 2\nprint(a + b)", true);
    let statements = ir.statements();
    assert_eq!(statements.len(), 1);
    let IrNode::StateMachine { state_var, blocks } = &statements[0] else {
        panic!("expected StateMachine, got {}", ir);
    };
    assert_eq!(state_var, STATE_VAR);
    assert_eq!(blocks.len(), 3);
    for (i, block) in blocks.iter().enumerate() {
        let IrNode::StateBlock { index, body } = block else {
            panic!("expected StateBlock");
        };
        assert_eq!(*index, i + 1);
        let IrNode::Assign { targets, values } = body.last().expect("state update") else {
            panic!("block must end with a state update");
        };
        assert_eq!(targets, &vec![STATE_VAR.to_string()]);
        if i + 1 == blocks.len() {
            assert_eq!(values[0], IrNode::nil());
        } else {
            assert_eq!(values[0], IrNode::integer(i as i64 + 2));
        }
    }
}

#[test]
fn flattening_skips_single_statement() {
    assert_eq!(lower("print(1)", true), lower("print(1)", false));
}

#[test]
fn statement_ranges_cover_top_level_statements() {
    let src = "a = 1\nif a then\n  b = 2\nend\nprint(a)\n";
    let script = Script::from_source("ranges.lua", src);
    let ranges = ast::top_level_statement_ranges(&script).expect("ranges");
    assert_eq!(ranges.len(), 3);
    assert_eq!(ranges[0].slice(src), "a = 1");
    assert_eq!(ranges[1].slice(src), "if a then\n  b = 2\nend");
    assert_eq!(ranges[2].slice(src), "print(a)");
}

#[test]
fn line_and_column_agree_with_pest_on_multibyte_text() {
    let src = "a = 'héllo'\n\nb = \"wörld ✓\" c = 1\n\tprint(a, b)\n";
    let script = Script::from_source("utf8.lua", src);
    for (offset, _) in src.char_indices().chain(std::iter::once((src.len(), ' '))) {
        let expected = pest::Position::new(src, offset).expect("char boundary").line_col();
        assert_eq!(script.line_col(offset), expected, "offset {}", offset);
    }
}

#[test]
fn large_inputs_keep_exact_statement_locations() {
    let count = 20_000;
    let src: String = (0..count).map(|i| format!("value_{} = {} -- ü\n", i, i)).collect();
    let script = Script::from_source("large.lua", src);
    let tree = ast::parse(&script).expect("parse");
    let statements = tree.statements();
    assert_eq!(statements.len(), count);
    let last = statements[count - 1].get_location().expect("location");
    assert_eq!((last.line, last.column), (count, 1));
    let span = statements[count - 1].get_span().expect("span");
    assert_eq!(span.end.line, count);
}
