//! file: core/src/passes/garbage.rs
//! description: dead-code injection over a finalized build.
//!
//! Injection runs after every fixup is resolved. The stream is rewritten
//! instruction by instruction, recording where each old instruction now
//! starts, and every jump operand is then relocated through that map. A
//! jump that targeted instruction `i` lands on the first garbage byte
//! inserted in front of `i`, so the garbage runs on that path too.
//!
//! Every sequence is stack neutral and touches no local, global or the
//! multi-result register:
//!
//! * `NOP`
//! * `LOADNIL; POP` or `LOADK k; POP`
//! * `LOADSTUB; CALL 0, 0, 1` (call the VM's empty function, keep nothing)

use std::collections::HashMap;

use crate::{
    bytecode::{Build, CompileError, MAX_OPERAND, OPERAND_WIDTH, Opcode, patch_operand, read_operand, write_operand},
    error::ShroudResult,
    rng::ShroudRng,
};

pub struct GarbageInjector {
    density: f64,
}

impl GarbageInjector {
    pub fn new(density: f64) -> Self {
        GarbageInjector { density: density.clamp(0.0, 1.0) }
    }

    /// Rewrite `build` in place. Returns the number of sequences inserted.
    pub fn inject(&self, build: &mut Build, rng: &mut ShroudRng) -> ShroudResult<usize> {
        if self.density <= 0.0 || build.instruction_offsets.is_empty() {
            return Ok(0);
        }

        let old_code = std::mem::take(&mut build.code);
        let mut code = Vec::with_capacity(old_code.len() * 2);
        let mut offsets = Vec::with_capacity(build.instruction_offsets.len() * 2);
        // old instruction start -> new start of whatever now precedes it
        let mut relocated: HashMap<usize, usize> = HashMap::with_capacity(build.instruction_offsets.len());
        // old instruction start -> new start of the instruction itself
        let mut moved: HashMap<usize, usize> = HashMap::with_capacity(build.instruction_offsets.len());
        let mut injected = 0;

        let starts = &build.instruction_offsets;
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(old_code.len());
            relocated.insert(start, code.len());
            if rng.chance(self.density) {
                self.emit_sequence(build, rng, &mut code, &mut offsets);
                injected += 1;
            }
            moved.insert(start, code.len());
            offsets.push(code.len());
            code.extend_from_slice(&old_code[start..end]);
        }

        // Every instruction start must stay addressable by a jump operand.
        if let Some(&last) = offsets.last().filter(|last| **last > MAX_OPERAND as usize) {
            return Err(CompileError::at(
                Opcode::Nop,
                last,
                format!("garbage grows the stream to {} bytes, past the 24-bit operand range", code.len()),
            )
            .boxed());
        }

        let mut jump_operands = Vec::with_capacity(build.jump_operands.len());
        for &operand in &build.jump_operands {
            let instruction = operand - 1;
            let new_instruction = *moved.get(&instruction).ok_or_else(|| {
                CompileError::at(Opcode::Jmp, instruction, "jump operand outside any instruction").boxed()
            })?;
            let new_operand = new_instruction + (operand - instruction);
            let target = read_operand(&old_code, operand)
                .ok_or_else(|| CompileError::at(Opcode::Jmp, instruction, "truncated jump operand").boxed())?
                as usize;
            let new_target = *relocated.get(&target).ok_or_else(|| {
                CompileError::at(Opcode::Jmp, instruction, format!("jump target {} is not an instruction", target))
                    .boxed()
            })?;
            if new_target > MAX_OPERAND as usize {
                return Err(CompileError::at(
                    Opcode::Jmp,
                    new_instruction,
                    format!("relocated jump target {} is past the 24-bit operand range", new_target),
                )
                .boxed());
            }
            patch_operand(&mut code, new_operand, new_target as u32);
            jump_operands.push(new_operand);
        }
        debug_assert!(jump_operands.iter().all(|p| p + OPERAND_WIDTH <= code.len()));

        log::debug!("injected {} garbage sequences ({} -> {} bytes)", injected, old_code.len(), code.len());
        build.code = code;
        build.instruction_offsets = offsets;
        build.jump_operands = jump_operands;
        build.stats.garbage_blocks += injected;
        Ok(injected)
    }

    fn emit_sequence(&self, build: &Build, rng: &mut ShroudRng, code: &mut Vec<u8>, offsets: &mut Vec<usize>) {
        let map = &build.opcode_map;
        let mut op = |code: &mut Vec<u8>, opcode: Opcode, operands: &[u32]| {
            offsets.push(code.len());
            code.push(map.encode(opcode));
            for v in operands {
                write_operand(code, *v);
            }
        };
        match rng.range(0, 3) {
            0 => op(code, Opcode::Nop, &[]),
            1 => {
                op(code, Opcode::LoadNil, &[]);
                op(code, Opcode::Pop, &[]);
            }
            2 if !build.constants.is_empty() => {
                let k = rng.range(0, build.constants.len() as u64 - 1) as u32;
                op(code, Opcode::LoadK, &[k]);
                op(code, Opcode::Pop, &[]);
            }
            _ => {
                op(code, Opcode::LoadStub, &[]);
                op(code, Opcode::Call, &[0, 0, 1]);
            }
        }
    }
}
