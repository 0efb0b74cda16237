use std::collections::HashMap;

use crate::passes::constants::{Constant, PoolEntry};

/// Identity used for deduplication: floats by bit pattern, the rest by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Integer(i64),
    Float(u64),
    String(Vec<u8>),
    Boolean(bool),
}

impl From<&Constant> for ConstantKey {
    fn from(value: &Constant) -> Self {
        match value {
            Constant::Integer(v) => ConstantKey::Integer(*v),
            Constant::Float(v) => ConstantKey::Float(v.to_bits()),
            Constant::String(s) => ConstantKey::String(s.clone()),
            Constant::Boolean(b) => ConstantKey::Boolean(*b),
        }
    }
}

/// Append-only constant pool. Nil never enters the pool.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
    index: HashMap<ConstantKey, usize>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, calling `encrypt` only the first time it is seen.
    pub fn intern<F>(&mut self, value: Constant, encrypt: F) -> usize
    where
        F: FnOnce(Constant) -> PoolEntry,
    {
        let key = ConstantKey::from(&value);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(encrypt(value));
        self.index.insert(key, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<PoolEntry> {
        self.entries
    }
}
