//! Handler bodies for the dispatch table, one per canonical opcode.
//!
//! Handlers run with `$pc` already past the opcode byte. `$rd()` reads the
//! next operand and advances `$pc`. Jump targets are 0-based byte offsets,
//! so a jump to `t` resumes at `$pc = t + 1`.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::bytecode::Opcode;

fn binary(op: &str) -> String {
    format!("local $y = $pop()\nlocal $x = $pop()\n$push($x {} $y)", op)
}

fn unary(op: &str) -> String {
    format!("$push({}$pop())", op)
}

const CALL: &str = "\
local $na, $va, $want = $rd(), $rd(), $rd()
local $n = $na
if $va == 1 then $n = $n + $MR end
local $args = {}
for $i = $n, 1, -1 do $args[$i] = $pop() end
local $f = $pop()
local $res = $pack($f($unpack($args, 1, $n)))
if $want == 0 then
  for $i = 1, $res.n do $push($res[$i]) end
  $MR = $res.n
else
  for $i = 1, $want - 1 do $push($res[$i]) end
end";

const RETURN: &str = "\
local $na, $va = $rd(), $rd()
local $n = $na
if $va == 1 then $n = $n + $MR end
for $i = $n, 1, -1 do $R[$i] = $pop() end
$RN = $n
$pc = $N + 1";

lazy_static! {
    static ref TEMPLATES: HashMap<Opcode, String> = {
        let mut m = HashMap::new();
        m.insert(Opcode::Nop, String::new());
        m.insert(Opcode::LoadK, "$push($K[$rd() + 1])".to_string());
        m.insert(Opcode::LoadNil, "$push(nil)".to_string());
        m.insert(Opcode::LoadTrue, "$push(true)".to_string());
        m.insert(Opcode::LoadFalse, "$push(false)".to_string());
        m.insert(Opcode::LoadStub, "$push($STUB)".to_string());
        m.insert(Opcode::GetGlobal, "$push($ENV[$K[$rd() + 1]])".to_string());
        m.insert(Opcode::SetGlobal, "local $k = $K[$rd() + 1]\n$ENV[$k] = $pop()".to_string());
        m.insert(Opcode::GetLocal, "$push($L[$rd()])".to_string());
        m.insert(Opcode::SetLocal, "local $slot = $rd()\n$L[$slot] = $pop()".to_string());
        m.insert(Opcode::Pop, "$pop()".to_string());
        m.insert(Opcode::Dup, "local $v = $pop()\n$push($v)\n$push($v)".to_string());
        m.insert(Opcode::Add, binary("+"));
        m.insert(Opcode::Sub, binary("-"));
        m.insert(Opcode::Mul, binary("*"));
        m.insert(Opcode::Div, binary("/"));
        m.insert(Opcode::Mod, binary("%"));
        m.insert(Opcode::Pow, binary("^"));
        m.insert(Opcode::Concat, binary(".."));
        m.insert(Opcode::Eq, binary("=="));
        m.insert(Opcode::Ne, binary("~="));
        m.insert(Opcode::Lt, binary("<"));
        m.insert(Opcode::Le, binary("<="));
        m.insert(Opcode::Gt, binary(">"));
        m.insert(Opcode::Ge, binary(">="));
        m.insert(Opcode::Not, unary("not "));
        m.insert(Opcode::Neg, unary("-"));
        m.insert(Opcode::Len, unary("#"));
        m.insert(Opcode::Jmp, "$pc = $rd() + 1".to_string());
        m.insert(Opcode::JmpIfNot, "local $t = $rd()\nif not $pop() then $pc = $t + 1 end".to_string());
        m.insert(Opcode::JmpIf, "local $t = $rd()\nif $pop() then $pc = $t + 1 end".to_string());
        m.insert(Opcode::Call, CALL.to_string());
        m.insert(Opcode::Return, RETURN.to_string());
        m
    };
}

/// Unexpanded handler body for `op`.
pub fn template(op: Opcode) -> &'static str {
    TEMPLATES.get(&op).map(String::as_str).unwrap_or("")
}
