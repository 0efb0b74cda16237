//! file: core/src/passes/constants.rs
//! description: constant encryptor.
//!
//! Every literal that reaches the constant pool goes through
//! `ConstantEncryptor::encrypt`, which picks a scheme by value type:
//!
//! * integers with `|v| <= 2^31`: `e = ((v + k1) * k2) ^ k3`;
//! * byte strings: 1..=8 byte chunks, each XORed with its own key byte,
//!   stored in shuffled order with their original position;
//! * floats and wide integers: their decimal text goes through the string
//!   scheme and the VM reads it back with `tonumber`;
//! * booleans: one bit masked with a random byte.
//!
//! Non-finite floats have no decimal text Lua can parse, so they stay raw and
//! the code generator spells them as `1/0`, `-1/0` or `0/0`.
//!
//! `PoolEntry::decrypt` is the exact inverse and is what the reference VM
//! runs; the emitted Lua performs the same arithmetic.

use crate::rng::ShroudRng;

/// A plain constant value as it appears in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    Float(f64),
    String(Vec<u8>),
    Boolean(bool),
}

impl Constant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Integer(_) | Constant::Float(_) => "number",
            Constant::String(_) => "string",
            Constant::Boolean(_) => "boolean",
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Integer(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{:?}", v),
            Constant::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Constant::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Largest magnitude the three-key integer scheme accepts.
pub const INTEGER_SCHEME_LIMIT: i64 = 1 << 31;

/// One encrypted slice of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringChunk {
    /// Position of the chunk in the original string.
    pub index: usize,
    pub key: u8,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    Raw(Constant),
    Integer { encrypted: i64, k1: i64, k2: i64, k3: i64 },
    /// String scheme. `numeric` entries decode to a number via `tonumber`.
    Text { chunks: Vec<StringChunk>, numeric: bool },
    Boolean { masked: u8, mask: u8 },
}

impl PoolEntry {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, PoolEntry::Raw(_))
    }

    pub fn decrypt(&self) -> Constant {
        match self {
            PoolEntry::Raw(value) => value.clone(),
            PoolEntry::Integer { encrypted, k1, k2, k3 } => {
                Constant::Integer(((encrypted ^ k3) / k2) - k1)
            }
            PoolEntry::Text { chunks, numeric } => {
                let bytes = decrypt_chunks(chunks);
                if *numeric {
                    parse_numeric_text(&bytes)
                } else {
                    Constant::String(bytes)
                }
            }
            PoolEntry::Boolean { masked, mask } => Constant::Boolean((masked ^ mask) & 1 == 1),
        }
    }
}

fn decrypt_chunks(chunks: &[StringChunk]) -> Vec<u8> {
    let mut ordered: Vec<&StringChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    ordered
        .iter()
        .flat_map(|c| c.bytes.iter().map(move |b| b ^ c.key))
        .collect()
}

fn parse_numeric_text(bytes: &[u8]) -> Constant {
    let text = String::from_utf8_lossy(bytes);
    match text.parse::<i64>() {
        Ok(v) => Constant::Integer(v),
        Err(_) => Constant::Float(text.parse::<f64>().unwrap_or(f64::NAN)),
    }
}

/// Which literal kinds get encrypted.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionFlags {
    pub strings: bool,
    pub numbers: bool,
    pub booleans: bool,
}

/// Per-pass counters reported in the build metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionStats {
    pub strings_encrypted: usize,
    pub numbers_encoded: usize,
    pub booleans_masked: usize,
}

pub struct ConstantEncryptor {
    flags: EncryptionFlags,
    pub stats: EncryptionStats,
}

impl ConstantEncryptor {
    pub fn new(flags: EncryptionFlags) -> Self {
        ConstantEncryptor { flags, stats: EncryptionStats::default() }
    }

    pub fn flags(&self) -> EncryptionFlags {
        self.flags
    }

    pub fn encrypt(&mut self, value: Constant, rng: &mut ShroudRng) -> PoolEntry {
        match value {
            Constant::Integer(v) if self.flags.numbers => {
                self.stats.numbers_encoded += 1;
                if v.unsigned_abs() <= INTEGER_SCHEME_LIMIT as u64 {
                    encrypt_integer(v, rng)
                } else {
                    PoolEntry::Text { chunks: encrypt_bytes(v.to_string().as_bytes(), rng), numeric: true }
                }
            }
            Constant::Float(v) if self.flags.numbers && v.is_finite() => {
                self.stats.numbers_encoded += 1;
                PoolEntry::Text { chunks: encrypt_bytes(format!("{:?}", v).as_bytes(), rng), numeric: true }
            }
            Constant::String(bytes) if self.flags.strings => {
                self.stats.strings_encrypted += 1;
                PoolEntry::Text { chunks: encrypt_bytes(&bytes, rng), numeric: false }
            }
            Constant::Boolean(b) if self.flags.booleans => {
                self.stats.booleans_masked += 1;
                let mask = rng.byte(2, u8::MAX - 1);
                PoolEntry::Boolean { masked: mask ^ b as u8, mask }
            }
            other => PoolEntry::Raw(other),
        }
    }
}

/// Three-key scheme for `|v| <= 2^31`. `v + k1` is always positive and the
/// product stays far below 2^53, so the Lua 5.1 double arithmetic is exact.
pub fn encrypt_integer(v: i64, rng: &mut ShroudRng) -> PoolEntry {
    let k1 = rng.range(1 << 31, (1 << 32) - 1) as i64;
    let k2 = rng.range(3, 251) as i64;
    let k3 = rng.range(1, (1 << 24) - 1) as i64;
    PoolEntry::Integer { encrypted: ((v + k1) * k2) ^ k3, k1, k2, k3 }
}

/// Split `bytes` into 1..=8 byte chunks, XOR each with its own key and
/// shuffle the chunk order. An empty input yields no chunks.
pub fn encrypt_bytes(bytes: &[u8], rng: &mut ShroudRng) -> Vec<StringChunk> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let size = (rng.range(1, 8) as usize).min(bytes.len() - pos);
        let key = rng.byte(1, u8::MAX);
        chunks.push(StringChunk {
            index: chunks.len(),
            key,
            bytes: bytes[pos..pos + size].iter().map(|b| b ^ key).collect(),
        });
        pos += size;
    }
    rng.shuffle(&mut chunks);
    chunks
}
