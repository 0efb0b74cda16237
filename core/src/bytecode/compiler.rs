//! file: core/src/bytecode/compiler.rs
//! description: IR -> bytecode.
//!
//! The compiler walks the IR with an exhaustive `match` and emits a stack
//! machine program against the `CompilerContext`. Conventions:
//!
//! * every expression compiled for one value leaves exactly one value;
//! * a call compiled with `want == MULTI` leaves all its results and
//!   records their count in the VM's multi-result register, which the next
//!   `CALL`/`RETURN` with the variadic flag consumes;
//! * `CALL a, b, c`: `a` fixed args, `b` variadic flag, `c` wanted results
//!   plus one (zero keeps every result);
//! * `RETURN a, b`: `a` fixed values, `b` variadic flag.
//!
//! A terminating `RETURN 0, 0` is always appended.

use std::collections::BTreeSet;

use crate::{
    ast::{BinaryOperator, LuaNumber},
    error::ShroudResult,
    ir::{IrNode, Literal},
    passes::{
        constants::{Constant, ConstantEncryptor, EncryptionFlags},
        identifiers::IdentifierObfuscator,
        opcodes::OpcodeMap,
    },
    rng::ShroudRng,
};

use super::{Build, Opcode, context::CompilerContext};

/// `want` value asking a call to keep all of its results.
const MULTI: u32 = u32::MAX;

/// Settings the compiler needs from `ObfuscationOptions`.
#[derive(Debug, Clone, Copy)]
pub struct CompileSettings {
    pub encryption: EncryptionFlags,
    pub rename_identifiers: bool,
    pub shuffle_opcodes: bool,
    pub opcode_polymorphism: bool,
}

/// Compile `ir` into a finalized build (fixups resolved, no garbage yet).
pub fn compile(ir: &IrNode, settings: CompileSettings, mut rng: ShroudRng) -> ShroudResult<Build> {
    let opcode_map = OpcodeMap::generate(&mut rng, settings.shuffle_opcodes, settings.opcode_polymorphism);
    let identifiers = IdentifierObfuscator::new(settings.rename_identifiers);
    let encryptor = ConstantEncryptor::new(settings.encryption);
    let mut compiler = Compiler { ctx: CompilerContext::new(opcode_map, identifiers, encryptor, rng) };

    let mut names = BTreeSet::new();
    collect_names(ir, &mut names);
    compiler.ctx.reserve_names(names);

    compiler.statement(ir)?;
    compiler.ctx.emit(Opcode::Return, &[0, 0])?;
    let build = compiler.ctx.finalize()?;
    log::debug!(
        "compiled {} bytes, {} constants, {} locals",
        build.code.len(),
        build.constants.len(),
        build.local_count()
    );
    Ok(build)
}

struct Compiler {
    ctx: CompilerContext,
}

impl Compiler {
    fn block(&mut self, body: &[IrNode]) -> ShroudResult<()> {
        self.ctx.push_scope();
        for node in body {
            self.statement(node)?;
        }
        self.ctx.pop_scope();
        Ok(())
    }

    fn statement(&mut self, node: &IrNode) -> ShroudResult<()> {
        match node {
            IrNode::Chunk(body) => {
                for statement in body {
                    self.statement(statement)?;
                }
            }
            IrNode::Local { names, values } => {
                self.adjust(values, names.len())?;
                // Declared after the values so `local x = x` reads the outer x.
                let mut slots = Vec::with_capacity(names.len());
                for name in names {
                    slots.push(self.ctx.declare_local(name)?);
                }
                for slot in slots.iter().rev() {
                    self.ctx.emit(Opcode::SetLocal, &[*slot])?;
                }
            }
            IrNode::Assign { targets, values } => {
                self.adjust(values, targets.len())?;
                for target in targets.iter().rev() {
                    self.store(target)?;
                }
            }
            IrNode::Call { .. } => self.call(node, 0)?,
            IrNode::If { cond, then_body, else_body } => {
                let end = self.ctx.new_label();
                self.expression(cond)?;
                match else_body {
                    Some(else_body) => {
                        let otherwise = self.ctx.new_label();
                        self.ctx.emit_jump(Opcode::JmpIfNot, otherwise)?;
                        self.block(then_body)?;
                        self.ctx.emit_jump(Opcode::Jmp, end)?;
                        self.ctx.mark(otherwise);
                        self.block(else_body)?;
                    }
                    None => {
                        self.ctx.emit_jump(Opcode::JmpIfNot, end)?;
                        self.block(then_body)?;
                    }
                }
                self.ctx.mark(end);
            }
            IrNode::While { cond, body } => {
                let head = self.ctx.new_label();
                let end = self.ctx.new_label();
                self.ctx.mark(head);
                self.expression(cond)?;
                self.ctx.emit_jump(Opcode::JmpIfNot, end)?;
                self.block(body)?;
                self.ctx.emit_jump(Opcode::Jmp, head)?;
                self.ctx.mark(end);
            }
            IrNode::Return(values) => {
                let (fixed, variadic) = self.list(values)?;
                self.ctx.emit(Opcode::Return, &[fixed, variadic as u32])?;
            }
            IrNode::StateMachine { state_var, blocks } => self.state_machine(state_var, blocks)?,
            IrNode::StateBlock { body, .. } => {
                for statement in body {
                    self.statement(statement)?;
                }
            }
            // Expression in statement position: evaluate and drop.
            IrNode::Literal(_) | IrNode::Identifier(_) | IrNode::Binary { .. } | IrNode::Unary { .. } => {
                self.expression(node)?;
                self.ctx.emit(Opcode::Pop, &[])?;
            }
        }
        Ok(())
    }

    /// Dispatch loop for a flattened chunk. Blocks are emitted in index order
    /// in the enclosing scope; the comparison chain is shuffled.
    fn state_machine(&mut self, state_var: &str, blocks: &[IrNode]) -> ShroudResult<()> {
        let state = self.ctx.declare_local(state_var)?;
        let head = self.ctx.new_label();
        let end = self.ctx.new_label();

        let first = blocks
            .iter()
            .filter_map(|b| match b {
                IrNode::StateBlock { index, .. } => Some(*index),
                _ => None,
            })
            .min()
            .unwrap_or(1);
        self.load_integer(first as i64)?;
        self.ctx.emit(Opcode::SetLocal, &[state])?;

        self.ctx.mark(head);
        self.ctx.emit(Opcode::GetLocal, &[state])?;
        self.ctx.emit(Opcode::LoadNil, &[])?;
        self.ctx.emit(Opcode::Ne, &[])?;
        self.ctx.emit_jump(Opcode::JmpIfNot, end)?;

        let mut entries: Vec<(usize, super::context::Label)> = Vec::with_capacity(blocks.len());
        for (pos, block) in blocks.iter().enumerate() {
            let index = match block {
                IrNode::StateBlock { index, .. } => *index,
                _ => pos + 1,
            };
            entries.push((index, self.ctx.new_label()));
        }
        let mut chain = entries.clone();
        self.ctx.rng.shuffle(&mut chain);
        for (index, label) in &chain {
            self.ctx.emit(Opcode::GetLocal, &[state])?;
            self.load_integer(*index as i64)?;
            self.ctx.emit(Opcode::Eq, &[])?;
            self.ctx.emit_jump(Opcode::JmpIf, *label)?;
        }
        // No block matched: leave the machine.
        self.ctx.emit_jump(Opcode::Jmp, end)?;

        for (block, (_, label)) in blocks.iter().zip(&entries) {
            self.ctx.mark(*label);
            self.statement(block)?;
            self.ctx.emit_jump(Opcode::Jmp, head)?;
        }
        self.ctx.mark(end);
        Ok(())
    }

    fn store(&mut self, name: &str) -> ShroudResult<()> {
        match self.ctx.resolve_local(name) {
            Some(slot) => {
                self.ctx.emit(Opcode::SetLocal, &[slot])?;
            }
            None => {
                self.ctx.note_global(name);
                let k = self.ctx.constant(Constant::String(name.as_bytes().to_vec()))?;
                self.ctx.emit(Opcode::SetGlobal, &[k])?;
            }
        }
        Ok(())
    }

    /// Evaluate `values` leaving exactly `count` values on the stack. Extra
    /// values are still evaluated for their side effects.
    fn adjust(&mut self, values: &[IrNode], count: usize) -> ShroudResult<()> {
        let n = values.len();
        for (i, value) in values.iter().enumerate() {
            let last = i + 1 == n;
            if last && value.is_multi_value() && count + 1 > n {
                self.call(value, (count + 1 - n) as u32)?;
                return Ok(());
            }
            self.expression(value)?;
            if i >= count {
                self.ctx.emit(Opcode::Pop, &[])?;
            }
        }
        for _ in n..count {
            self.ctx.emit(Opcode::LoadNil, &[])?;
        }
        Ok(())
    }

    /// Push an expression list; a trailing multi-value call keeps all of its
    /// results. Returns `(fixed count, variadic flag)`.
    fn list(&mut self, values: &[IrNode]) -> ShroudResult<(u32, bool)> {
        let n = values.len();
        for (i, value) in values.iter().enumerate() {
            if i + 1 == n && value.is_multi_value() {
                self.call(value, MULTI)?;
                return Ok(((n - 1) as u32, true));
            }
            self.expression(value)?;
        }
        Ok((n as u32, false))
    }

    fn call(&mut self, node: &IrNode, want: u32) -> ShroudResult<()> {
        let IrNode::Call { callee, args, .. } = node else {
            self.expression(node)?;
            return Ok(());
        };
        self.expression(callee)?;
        let (fixed, variadic) = self.list(args)?;
        let results = if want == MULTI { 0 } else { want + 1 };
        self.ctx.emit(Opcode::Call, &[fixed, variadic as u32, results])?;
        Ok(())
    }

    fn load_integer(&mut self, v: i64) -> ShroudResult<()> {
        let k = self.ctx.constant(Constant::Integer(v))?;
        self.ctx.emit(Opcode::LoadK, &[k])?;
        Ok(())
    }

    /// Compile `node` leaving exactly one value on the stack.
    fn expression(&mut self, node: &IrNode) -> ShroudResult<()> {
        match node {
            IrNode::Literal(Literal::Nil) => {
                self.ctx.emit(Opcode::LoadNil, &[])?;
            }
            IrNode::Literal(Literal::Boolean(b)) => {
                if self.ctx.encrypts_booleans() {
                    let k = self.ctx.constant(Constant::Boolean(*b))?;
                    self.ctx.emit(Opcode::LoadK, &[k])?;
                } else {
                    self.ctx.emit(if *b { Opcode::LoadTrue } else { Opcode::LoadFalse }, &[])?;
                }
            }
            IrNode::Literal(Literal::Number(n)) => {
                let value = match n {
                    LuaNumber::Integer(v) => Constant::Integer(*v),
                    LuaNumber::Float(v) => Constant::Float(*v),
                };
                let k = self.ctx.constant(value)?;
                self.ctx.emit(Opcode::LoadK, &[k])?;
            }
            IrNode::Literal(Literal::String(s)) => {
                let k = self.ctx.constant(Constant::String(s.clone()))?;
                self.ctx.emit(Opcode::LoadK, &[k])?;
            }
            IrNode::Identifier(name) => match self.ctx.resolve_local(name) {
                Some(slot) => {
                    self.ctx.emit(Opcode::GetLocal, &[slot])?;
                }
                None => {
                    self.ctx.note_global(name);
                    let k = self.ctx.constant(Constant::String(name.as_bytes().to_vec()))?;
                    self.ctx.emit(Opcode::GetGlobal, &[k])?;
                }
            },
            IrNode::Binary { op: BinaryOperator::And, left, right } => self.short_circuit(left, right, Opcode::JmpIfNot)?,
            IrNode::Binary { op: BinaryOperator::Or, left, right } => self.short_circuit(left, right, Opcode::JmpIf)?,
            IrNode::Binary { op, left, right } => {
                self.expression(left)?;
                self.expression(right)?;
                if let Some(opcode) = Opcode::from_binary(*op) {
                    self.ctx.emit(opcode, &[])?;
                }
            }
            IrNode::Unary { op, operand } => {
                self.expression(operand)?;
                self.ctx.emit(Opcode::from_unary(*op), &[])?;
            }
            IrNode::Call { .. } => self.call(node, 1)?,
            // Statements never appear in expression position; keep the stack balanced anyway.
            IrNode::Chunk(_)
            | IrNode::Assign { .. }
            | IrNode::Local { .. }
            | IrNode::If { .. }
            | IrNode::While { .. }
            | IrNode::Return(_)
            | IrNode::StateBlock { .. }
            | IrNode::StateMachine { .. } => {
                self.statement(node)?;
                self.ctx.emit(Opcode::LoadNil, &[])?;
            }
        }
        Ok(())
    }

    /// `a and b` / `a or b`: keep `a` when it decides the result, otherwise
    /// drop it and evaluate `b`.
    fn short_circuit(&mut self, left: &IrNode, right: &IrNode, jump: Opcode) -> ShroudResult<()> {
        let end = self.ctx.new_label();
        self.expression(left)?;
        self.ctx.emit(Opcode::Dup, &[])?;
        self.ctx.emit_jump(jump, end)?;
        self.ctx.emit(Opcode::Pop, &[])?;
        self.expression(right)?;
        self.ctx.mark(end);
        Ok(())
    }
}

/// Every name the program mentions, so aliases can avoid them.
fn collect_names(node: &IrNode, out: &mut BTreeSet<String>) {
    let all = |nodes: &[IrNode], out: &mut BTreeSet<String>| {
        for n in nodes {
            collect_names(n, out);
        }
    };
    match node {
        IrNode::Chunk(body) | IrNode::Return(body) => all(body, out),
        IrNode::Assign { targets, values } => {
            out.extend(targets.iter().cloned());
            all(values, out);
        }
        IrNode::Local { names, values } => {
            out.extend(names.iter().cloned());
            all(values, out);
        }
        IrNode::Call { callee, args, .. } => {
            collect_names(callee, out);
            all(args, out);
        }
        IrNode::Literal(_) => {}
        IrNode::Identifier(name) => {
            out.insert(name.clone());
        }
        IrNode::Binary { left, right, .. } => {
            collect_names(left, out);
            collect_names(right, out);
        }
        IrNode::Unary { operand, .. } => collect_names(operand, out),
        IrNode::If { cond, then_body, else_body } => {
            collect_names(cond, out);
            all(then_body, out);
            if let Some(else_body) = else_body {
                all(else_body, out);
            }
        }
        IrNode::While { cond, body } => {
            collect_names(cond, out);
            all(body, out);
        }
        IrNode::StateBlock { body, .. } => all(body, out),
        IrNode::StateMachine { blocks, .. } => all(blocks, out),
    }
}
