//! Opcode mapper: assigns every canonical opcode the byte it is emitted as.

use std::collections::HashMap;

use crate::{bytecode::Opcode, rng::ShroudRng};

/// Bijection between canonical opcodes and emitted bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeMap {
    codes: [u8; Opcode::COUNT],
    /// Per-build byte XORed into every code, zero when polymorphism is off.
    key: u8,
}

impl OpcodeMap {
    /// Codes `1..=33` in canonical order.
    pub fn canonical() -> Self {
        let mut codes = [0u8; Opcode::COUNT];
        for (i, code) in codes.iter_mut().enumerate() {
            *code = (i + 1) as u8;
        }
        OpcodeMap { codes, key: 0 }
    }

    pub fn generate(rng: &mut ShroudRng, shuffle: bool, polymorphism: bool) -> Self {
        let mut map = Self::canonical();
        if shuffle {
            let mut pool: Vec<u8> = (0..=u8::MAX).collect();
            rng.shuffle(&mut pool);
            map.codes.copy_from_slice(&pool[..Opcode::COUNT]);
        }
        if polymorphism {
            map.key = rng.byte(1, u8::MAX);
            for code in map.codes.iter_mut() {
                *code ^= map.key;
            }
        }
        log::debug!("opcode map ready (shuffle: {}, polymorphism key: {:#04x})", shuffle, map.key);
        map
    }

    pub fn encode(&self, op: Opcode) -> u8 {
        self.codes[op.index()]
    }

    pub fn decode(&self, code: u8) -> Option<Opcode> {
        self.codes.iter().position(|c| *c == code).map(|i| Opcode::ALL[i])
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn is_injective(&self) -> bool {
        let mut seen = [false; 256];
        self.codes.iter().all(|c| !std::mem::replace(&mut seen[*c as usize], true))
    }

    /// Reverse table for decoders that run many lookups.
    pub fn inverse(&self) -> HashMap<u8, Opcode> {
        Opcode::ALL.iter().map(|op| (self.encode(*op), *op)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Opcode, u8)> + '_ {
        Opcode::ALL.iter().map(move |op| (*op, self.encode(*op)))
    }
}
