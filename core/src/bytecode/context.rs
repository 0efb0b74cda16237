//! file: core/src/bytecode/context.rs
//! description: per-compilation state.
//!
//! `CompilerContext` owns everything one compilation mutates: the output
//! buffer, the constant pool, labels and pending fixups, the local scope
//! stack and the passes consulted while emitting. Nothing here is shared
//! between compilations, so chunk workers can each own one.

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::ShroudResult,
    passes::{
        constants::{Constant, ConstantEncryptor},
        identifiers::IdentifierObfuscator,
        opcodes::OpcodeMap,
    },
    rng::ShroudRng,
};

use super::{
    Build, BuildStats, CompileError, MAX_OPERAND, OPERAND_WIDTH, Opcode, patch_operand, pool::ConstantPool,
    write_operand,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Operand positions still waiting for a label's offset.
#[derive(Debug, Clone)]
struct Fixup {
    opcode: Opcode,
    instruction: usize,
    operand: usize,
}

pub struct CompilerContext {
    code: Vec<u8>,
    pool: ConstantPool,
    opcode_map: OpcodeMap,
    labels: Vec<Option<usize>>,
    fixups: HashMap<Label, Vec<Fixup>>,
    instruction_offsets: Vec<usize>,
    jump_operands: Vec<usize>,
    scopes: Vec<HashMap<String, u32>>,
    local_names: Vec<String>,
    globals: BTreeSet<String>,
    identifiers: IdentifierObfuscator,
    encryptor: ConstantEncryptor,
    locals_declared: usize,
    pub rng: ShroudRng,
}

impl CompilerContext {
    pub fn new(
        opcode_map: OpcodeMap,
        identifiers: IdentifierObfuscator,
        encryptor: ConstantEncryptor,
        rng: ShroudRng,
    ) -> Self {
        CompilerContext {
            code: Vec::new(),
            pool: ConstantPool::new(),
            opcode_map,
            labels: Vec::new(),
            fixups: HashMap::new(),
            instruction_offsets: Vec::new(),
            jump_operands: Vec::new(),
            scopes: vec![HashMap::new()],
            local_names: Vec::new(),
            globals: BTreeSet::new(),
            identifiers,
            encryptor,
            locals_declared: 0,
            rng,
        }
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Emit `op` with its operands. Operand counts are checked against the
    /// opcode and every operand must fit in `OPERAND_WIDTH` bytes.
    pub fn emit(&mut self, op: Opcode, operands: &[u32]) -> ShroudResult<usize> {
        if operands.len() != op.operand_count() {
            return Err(CompileError::at(
                op,
                self.offset(),
                format!("expected {} operands, got {}", op.operand_count(), operands.len()),
            )
            .boxed());
        }
        if let Some(bad) = operands.iter().find(|v| **v > MAX_OPERAND) {
            return Err(CompileError::at(op, self.offset(), format!("operand {} out of range", bad)).boxed());
        }
        let at = self.offset();
        self.instruction_offsets.push(at);
        self.code.push(self.opcode_map.encode(op));
        for value in operands {
            write_operand(&mut self.code, *value);
        }
        Ok(at)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn mark(&mut self, label: Label) {
        let here = self.offset();
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(here);
        }
    }

    /// Emit a jump whose operand is patched once `label` is marked.
    pub fn emit_jump(&mut self, op: Opcode, label: Label) -> ShroudResult<()> {
        let at = self.emit(op, &[0])?;
        let operand = at + 1;
        self.jump_operands.push(operand);
        self.fixups.entry(label).or_default().push(Fixup { opcode: op, instruction: at, operand });
        Ok(())
    }

    /// Pool index for `value`, encrypting it the first time it is seen.
    pub fn constant(&mut self, value: Constant) -> ShroudResult<u32> {
        let at = self.offset();
        let encryptor = &mut self.encryptor;
        let rng = &mut self.rng;
        let idx = self.pool.intern(value, |v| encryptor.encrypt(v, rng));
        u32::try_from(idx)
            .ok()
            .filter(|i| *i <= MAX_OPERAND)
            .ok_or_else(|| CompileError::at(Opcode::LoadK, at, "constant pool overflow").boxed())
    }

    pub fn encrypts_booleans(&self) -> bool {
        self.encryptor.flags().booleans
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Allocate a fresh slot for `name` in the innermost scope. Slots are
    /// never reused, so a shadowed outer local keeps its value.
    pub fn declare_local(&mut self, name: &str) -> ShroudResult<u32> {
        let slot = self.local_names.len() as u32;
        if slot > MAX_OPERAND {
            return Err(CompileError::at(Opcode::SetLocal, self.offset(), "too many locals").boxed());
        }
        let alias = if name.starts_with('$') {
            name.to_string()
        } else {
            self.locals_declared += 1;
            self.identifiers.alias(name, &mut self.rng)
        };
        self.local_names.push(alias);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        Ok(slot)
    }

    pub fn resolve_local(&self, name: &str) -> Option<u32> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    /// Keep `names` out of the alias space.
    pub fn reserve_names<I: IntoIterator<Item = String>>(&mut self, names: I) {
        self.identifiers.reserve(names);
    }

    pub fn note_global(&mut self, name: &str) {
        self.globals.insert(name.to_string());
    }

    /// Patch every fixup and hand back the finished build. Any label that
    /// was jumped to but never marked is a compiler defect.
    pub fn finalize(mut self) -> ShroudResult<Build> {
        let fixups = std::mem::take(&mut self.fixups);
        for (label, sites) in fixups {
            let target = self.labels.get(label.0).copied().flatten();
            for site in sites {
                let Some(target) = target else {
                    return Err(CompileError::at(site.opcode, site.instruction, "unresolved jump label").boxed());
                };
                if target >= self.code.len() || target as u32 > MAX_OPERAND {
                    return Err(CompileError::at(
                        site.opcode,
                        site.instruction,
                        format!("jump target {} outside the bytecode", target),
                    )
                    .boxed());
                }
                patch_operand(&mut self.code, site.operand, target as u32);
            }
        }
        debug_assert!(self.jump_operands.iter().all(|p| p + OPERAND_WIDTH <= self.code.len()));

        let enc = self.encryptor.stats;
        Ok(Build {
            code: self.code,
            constants: self.pool.into_entries(),
            opcode_map: self.opcode_map,
            instruction_offsets: self.instruction_offsets,
            jump_operands: self.jump_operands,
            local_names: self.local_names,
            globals: self.globals,
            identifiers: self.identifiers,
            stats: BuildStats {
                strings_encrypted: enc.strings_encrypted,
                numbers_encoded: enc.numbers_encoded,
                booleans_masked: enc.booleans_masked,
                locals_declared: self.locals_declared,
                garbage_blocks: 0,
            },
        })
    }
}
