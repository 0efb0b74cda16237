//! file: core/src/rng.rs
//! description: seeded pseudo-random source for every randomized pass.
//!
//! A build is reproducible when `ObfuscationOptions::seed` is set; otherwise
//! the seed is drawn from a v4 uuid. The stream comes from ChaCha8, which is
//! portable, so a given seed yields the same output on every platform.

use rand::{Rng, RngCore, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct ShroudRng {
    inner: ChaCha8Rng,
}

impl ShroudRng {
    pub fn new(seed: u64) -> Self {
        ShroudRng { inner: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// A fresh seed from uuid v4 entropy.
    pub fn entropy_seed() -> u64 {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&bytes[..8]);
        u64::from_le_bytes(seed)
    }

    pub fn from_entropy() -> Self {
        Self::new(Self::entropy_seed())
    }

    /// Seed for sub-job `index` of a job seeded with `seed`. Each index reads
    /// its own ChaCha stream, so neighbouring indices are unrelated.
    pub fn derive_seed(seed: u64, index: u64) -> u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(index);
        rng.next_u64()
    }

    /// Uniform value in `[low, high]` (inclusive).
    pub fn range(&mut self, low: u64, high: u64) -> u64 {
        debug_assert!(low <= high);
        self.inner.gen_range(low..=high)
    }

    /// Uniform byte in `[low, high]`.
    pub fn byte(&mut self, low: u8, high: u8) -> u8 {
        self.inner.gen_range(low..=high)
    }

    /// `true` with probability `p`, clamped to `[0, 1]`.
    pub fn chance(&mut self, p: f64) -> bool {
        if p.is_nan() {
            return false;
        }
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.inner)
    }
}

impl RngCore for ShroudRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
