//! file: core/src/vm/exec.rs
//! description: bytecode executor.
//!
//! Decodes one instruction at a time through the inverse opcode map and
//! runs it against an `ExecState`: the operand stack, local slots, the
//! multi-result register and the globals table. Semantics follow the
//! handlers the code generator emits, so a build behaves the same here as
//! in the generated Lua.

use std::{cmp::Ordering, collections::HashMap};

use crate::{
    bytecode::{Build, OPERAND_WIDTH, Opcode, read_operand},
    error::ShroudResult,
    vm::{err::RuntimeError, host::run_builtin, value::Value},
};

pub(crate) struct ExecState<'a> {
    pub code: &'a [u8],
    pub inverse: HashMap<u8, Opcode>,
    pub constants: Vec<Value>,
    pub globals: &'a mut HashMap<Vec<u8>, Value>,
    pub output: &'a mut String,
    pub stack: Vec<Value>,
    pub locals: HashMap<u32, Value>,
    /// Values left by the last call compiled to keep all of its results.
    pub mr: usize,
    pub pc: usize,
    pub steps: usize,
    pub returned: Option<Vec<Value>>,
}

impl ExecState<'_> {
    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "operand stack underflow".to_string())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, String> {
        if n > self.stack.len() {
            return Err("operand stack underflow".to_string());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn constant(&self, index: u32) -> Result<Value, String> {
        self.constants
            .get(index as usize)
            .cloned()
            .ok_or_else(|| format!("constant {} out of range", index))
    }

    fn global_name(&self, index: u32) -> Result<Vec<u8>, String> {
        match self.constant(index)? {
            Value::Str(name) => Ok(name),
            other => Err(format!("global name is a {}", other.type_name())),
        }
    }
}

fn arith_error(a: &Value, b: &Value) -> String {
    let bad = if a.to_number().is_none() { a } else { b };
    format!("attempt to perform arithmetic on a {} value", bad.type_name())
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn arith(op: Opcode, a: &Value, b: &Value) -> Result<Value, String> {
    let (Some(x), Some(y)) = (a.to_number(), b.to_number()) else {
        return Err(arith_error(a, b));
    };
    if let (Value::Integer(i), Value::Integer(j)) = (&x, &y) {
        let (i, j) = (*i, *j);
        match op {
            Opcode::Add => return Ok(Value::Integer(i.wrapping_add(j))),
            Opcode::Sub => return Ok(Value::Integer(i.wrapping_sub(j))),
            Opcode::Mul => return Ok(Value::Integer(i.wrapping_mul(j))),
            Opcode::Mod => {
                if j == 0 {
                    return Err("attempt to perform 'n%0'".to_string());
                }
                let mut r = i.wrapping_rem(j);
                if r != 0 && (r ^ j) < 0 {
                    r += j;
                }
                return Ok(Value::Integer(r));
            }
            _ => {}
        }
    }
    let (x, y) = (as_float(&x), as_float(&y));
    Ok(Value::Float(match op {
        Opcode::Add => x + y,
        Opcode::Sub => x - y,
        Opcode::Mul => x * y,
        Opcode::Div => x / y,
        Opcode::Pow => x.powf(y),
        Opcode::Mod => {
            let mut r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r += y;
            }
            r
        }
        _ => return Err(format!("{} is not arithmetic", op)),
    }))
}

fn concat_piece(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Str(s) => Some(s.clone()),
        Value::Integer(_) | Value::Float(_) => Some(v.to_display_bytes()),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Option<Ordering>, String> {
    match (a, b) {
        (Value::Integer(i), Value::Integer(j)) => Ok(Some(i.cmp(j))),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            Ok(as_float(a).partial_cmp(&as_float(b)))
        }
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        _ if a.type_name() == b.type_name() => Err(format!("attempt to compare two {} values", a.type_name())),
        _ => Err(format!("attempt to compare {} with {}", a.type_name(), b.type_name())),
    }
}

pub(crate) fn dispatch_op(state: &mut ExecState, op: Opcode, operands: &[u32]) -> Result<(), String> {
    match op {
        Opcode::Nop => {}
        Opcode::LoadK => {
            let v = state.constant(operands[0])?;
            state.stack.push(v);
        }
        Opcode::LoadNil => state.stack.push(Value::Nil),
        Opcode::LoadTrue => state.stack.push(Value::Boolean(true)),
        Opcode::LoadFalse => state.stack.push(Value::Boolean(false)),
        Opcode::LoadStub => state.stack.push(Value::Stub),
        Opcode::GetGlobal => {
            let name = state.global_name(operands[0])?;
            let v = state.globals.get(&name).cloned().unwrap_or(Value::Nil);
            state.stack.push(v);
        }
        Opcode::SetGlobal => {
            let name = state.global_name(operands[0])?;
            let v = state.pop()?;
            if matches!(v, Value::Nil) {
                state.globals.remove(&name);
            } else {
                state.globals.insert(name, v);
            }
        }
        Opcode::GetLocal => {
            let v = state.locals.get(&operands[0]).cloned().unwrap_or(Value::Nil);
            state.stack.push(v);
        }
        Opcode::SetLocal => {
            let v = state.pop()?;
            state.locals.insert(operands[0], v);
        }
        Opcode::Pop => {
            state.pop()?;
        }
        Opcode::Dup => {
            let v = state.stack.last().cloned().ok_or_else(|| "operand stack underflow".to_string())?;
            state.stack.push(v);
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Pow => {
            let b = state.pop()?;
            let a = state.pop()?;
            state.stack.push(arith(op, &a, &b)?);
        }
        Opcode::Concat => {
            let b = state.pop()?;
            let a = state.pop()?;
            match (concat_piece(&a), concat_piece(&b)) {
                (Some(mut x), Some(y)) => {
                    x.extend_from_slice(&y);
                    state.stack.push(Value::Str(x));
                }
                (None, _) => return Err(format!("attempt to concatenate a {} value", a.type_name())),
                (_, None) => return Err(format!("attempt to concatenate a {} value", b.type_name())),
            }
        }
        Opcode::Eq | Opcode::Ne => {
            let b = state.pop()?;
            let a = state.pop()?;
            let eq = a.raw_equals(&b);
            state.stack.push(Value::Boolean(if op == Opcode::Eq { eq } else { !eq }));
        }
        Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
            let b = state.pop()?;
            let a = state.pop()?;
            let ord = compare(&a, &b)?;
            let result = match (op, ord) {
                (_, None) => false,
                (Opcode::Lt, Some(o)) => o == Ordering::Less,
                (Opcode::Le, Some(o)) => o != Ordering::Greater,
                (Opcode::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            };
            state.stack.push(Value::Boolean(result));
        }
        Opcode::Not => {
            let v = state.pop()?;
            state.stack.push(Value::Boolean(!v.is_truthy()));
        }
        Opcode::Neg => {
            let v = state.pop()?;
            let negated = match v.to_number() {
                Some(Value::Integer(i)) => Value::Integer(i.wrapping_neg()),
                Some(Value::Float(f)) => Value::Float(-f),
                _ => return Err(format!("attempt to perform arithmetic on a {} value", v.type_name())),
            };
            state.stack.push(negated);
        }
        Opcode::Len => {
            let v = state.pop()?;
            match v {
                Value::Str(s) => state.stack.push(Value::Integer(s.len() as i64)),
                other => return Err(format!("attempt to get length of a {} value", other.type_name())),
            }
        }
        Opcode::Jmp => state.pc = operands[0] as usize,
        Opcode::JmpIfNot => {
            if !state.pop()?.is_truthy() {
                state.pc = operands[0] as usize;
            }
        }
        Opcode::JmpIf => {
            if state.pop()?.is_truthy() {
                state.pc = operands[0] as usize;
            }
        }
        Opcode::Call => {
            let mut n = operands[0] as usize;
            if operands[1] == 1 {
                n += state.mr;
            }
            let args = state.pop_n(n)?;
            let callee = state.pop()?;
            let results = match callee {
                Value::Builtin(builtin) => run_builtin(builtin, &args, state.output)?,
                Value::Stub => Vec::new(),
                other => return Err(format!("attempt to call a {} value", other.type_name())),
            };
            match operands[2] {
                0 => {
                    state.mr = results.len();
                    state.stack.extend(results);
                }
                c => {
                    let want = c as usize - 1;
                    let mut results = results;
                    results.resize(want, Value::Nil);
                    state.stack.extend(results);
                }
            }
        }
        Opcode::Return => {
            let mut n = operands[0] as usize;
            if operands[1] == 1 {
                n += state.mr;
            }
            let values = state.pop_n(n)?;
            state.returned = Some(values);
        }
    }
    Ok(())
}

pub(crate) fn run_build(
    build: &Build,
    globals: &mut HashMap<Vec<u8>, Value>,
    output: &mut String,
    step_limit: Option<usize>,
) -> ShroudResult<Vec<Value>> {
    let mut state = ExecState {
        code: &build.code,
        inverse: build.opcode_map.inverse(),
        constants: build.constants.iter().map(|entry| Value::from(entry.decrypt())).collect(),
        globals,
        output,
        stack: Vec::new(),
        locals: HashMap::new(),
        mr: 0,
        pc: 0,
        steps: 0,
        returned: None,
    };

    while state.pc < state.code.len() {
        let at = state.pc;
        let byte = state.code[at];
        let op = *state
            .inverse
            .get(&byte)
            .ok_or_else(|| RuntimeError::at(at, format!("unknown opcode byte {:#04x}", byte)).boxed())?;
        let mut operands = [0u32; 3];
        for (i, slot) in operands.iter_mut().take(op.operand_count()).enumerate() {
            *slot = read_operand(state.code, at + 1 + i * OPERAND_WIDTH)
                .ok_or_else(|| RuntimeError::at(at, "truncated operand").boxed())?;
        }
        state.pc = at + op.width();

        state.steps += 1;
        if step_limit.is_some_and(|limit| state.steps > limit) {
            return Err(RuntimeError::at(at, "step limit exceeded").boxed());
        }
        log::trace!("{:06} {} {:?}", at, op, &operands[..op.operand_count()]);

        dispatch_op(&mut state, op, &operands[..op.operand_count()]).map_err(|e| RuntimeError::at(at, e).boxed())?;
        if let Some(values) = state.returned.take() {
            return Ok(values);
        }
    }
    Ok(Vec::new())
}
