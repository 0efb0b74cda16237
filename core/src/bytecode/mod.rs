//! Linear bytecode: instruction encoding, the compiler that produces it and
//! the `Build` it hands to the code generator.
//!
//! Layout: one mapped opcode byte followed by `operand_count` operands of
//! `OPERAND_WIDTH` bytes each, big-endian. Jump operands are absolute byte
//! offsets into the same buffer.

pub mod compiler;
pub mod context;
pub mod disasm;
pub mod err;
pub mod opcode;
pub mod pool;

use std::collections::BTreeSet;

pub use compiler::compile;
pub use err::CompileError;
pub use opcode::Opcode;

use crate::{
    error::ShroudResult,
    passes::{constants::PoolEntry, identifiers::IdentifierObfuscator, opcodes::OpcodeMap},
};

pub const OPERAND_WIDTH: usize = 3;
pub const MAX_OPERAND: u32 = (1 << (8 * OPERAND_WIDTH)) - 1;

pub fn write_operand(code: &mut Vec<u8>, value: u32) {
    code.extend_from_slice(&value.to_be_bytes()[1..]);
}

pub fn patch_operand(code: &mut [u8], position: usize, value: u32) {
    code[position..position + OPERAND_WIDTH].copy_from_slice(&value.to_be_bytes()[1..]);
}

pub fn read_operand(code: &[u8], position: usize) -> Option<u32> {
    let bytes = code.get(position..position + OPERAND_WIDTH)?;
    Some(bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

/// Counters gathered while compiling, surfaced through `Metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub strings_encrypted: usize,
    pub numbers_encoded: usize,
    pub booleans_masked: usize,
    pub locals_declared: usize,
    pub garbage_blocks: usize,
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<u32>,
}

impl Instruction {
    pub fn width(&self) -> usize {
        self.opcode.width()
    }
}

/// Output of the bytecode compiler, consumed by the code generator.
#[derive(Debug, Clone)]
pub struct Build {
    /// Instruction stream with mapped opcodes, before bulk encryption.
    pub code: Vec<u8>,
    pub constants: Vec<PoolEntry>,
    pub opcode_map: OpcodeMap,
    /// Start offset of every instruction, in order.
    pub instruction_offsets: Vec<usize>,
    /// Byte position of every jump operand.
    pub jump_operands: Vec<usize>,
    /// Alias of each local slot, by slot number.
    pub local_names: Vec<String>,
    /// Global names the program reads or writes.
    pub globals: BTreeSet<String>,
    pub identifiers: IdentifierObfuscator,
    pub stats: BuildStats,
}

impl Build {
    pub fn local_count(&self) -> usize {
        self.local_names.len()
    }

    /// Decode the whole stream through the inverse opcode map.
    pub fn decode(&self) -> ShroudResult<Vec<Instruction>> {
        decode(&self.code, &self.opcode_map)
    }

    /// Canonical opcodes that occur in the stream.
    pub fn used_opcodes(&self) -> ShroudResult<BTreeSet<Opcode>> {
        Ok(self.decode()?.into_iter().map(|i| i.opcode).collect())
    }

    /// Every jump target, in instruction order.
    pub fn jump_targets(&self) -> Vec<usize> {
        self.jump_operands
            .iter()
            .filter_map(|pos| read_operand(&self.code, *pos))
            .map(|t| t as usize)
            .collect()
    }
}

pub fn decode(code: &[u8], map: &OpcodeMap) -> ShroudResult<Vec<Instruction>> {
    let inverse = map.inverse();
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let Some(opcode) = inverse.get(&code[pc]).copied() else {
            return Err(CompileError::at(Opcode::Nop, pc, format!("unknown opcode byte {:#04x}", code[pc])).boxed());
        };
        let mut operands = Vec::with_capacity(opcode.operand_count());
        for i in 0..opcode.operand_count() {
            let pos = pc + 1 + i * OPERAND_WIDTH;
            let value = read_operand(code, pos)
                .ok_or_else(|| CompileError::at(opcode, pc, "truncated operand").boxed())?;
            operands.push(value);
        }
        out.push(Instruction { offset: pc, opcode, operands });
        pc += opcode.width();
    }
    Ok(out)
}
