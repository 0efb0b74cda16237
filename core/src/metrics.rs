use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{bytecode::BuildStats, codegen::Generated};

/// Per-pass counters. Chunked jobs sum them across chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassCounters {
    pub identifiers_renamed: usize,
    pub locals_declared: usize,
    pub strings_encrypted: usize,
    pub numbers_encoded: usize,
    pub booleans_masked: usize,
    pub garbage_blocks: usize,
    pub anti_debug_checks: usize,
}

impl PassCounters {
    pub fn from_build(stats: &BuildStats, generated: &Generated) -> Self {
        PassCounters {
            identifiers_renamed: generated.identifiers_renamed,
            locals_declared: stats.locals_declared,
            strings_encrypted: stats.strings_encrypted,
            numbers_encoded: stats.numbers_encoded,
            booleans_masked: stats.booleans_masked,
            garbage_blocks: stats.garbage_blocks,
            anti_debug_checks: generated.anti_debug_checks,
        }
    }

    pub fn merge(&mut self, other: &PassCounters) {
        self.identifiers_renamed += other.identifiers_renamed;
        self.locals_declared += other.locals_declared;
        self.strings_encrypted += other.strings_encrypted;
        self.numbers_encoded += other.numbers_encoded;
        self.booleans_masked += other.booleans_masked;
        self.garbage_blocks += other.garbage_blocks;
        self.anti_debug_checks += other.anti_debug_checks;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub seed: u64,
    pub input_bytes: usize,
    pub output_bytes: usize,
    /// `output_bytes / input_bytes`, zero for empty input.
    pub size_ratio: f64,
    pub duration_ms: u64,
    pub chunk_count: usize,
    pub gaps: usize,
    #[serde(flatten)]
    pub counters: PassCounters,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl Metrics {
    pub fn start(input_bytes: usize, seed: u64) -> Self {
        Metrics {
            build_id: Uuid::new_v4(),
            started_at: Utc::now(),
            seed,
            input_bytes,
            output_bytes: 0,
            size_ratio: 0.0,
            duration_ms: 0,
            chunk_count: 1,
            gaps: 0,
            counters: PassCounters::default(),
            clock: Some(Instant::now()),
        }
    }

    pub fn finish(&mut self, output_bytes: usize) {
        self.output_bytes = output_bytes;
        self.size_ratio = if self.input_bytes == 0 { 0.0 } else { output_bytes as f64 / self.input_bytes as f64 };
        if let Some(clock) = self.clock.take() {
            self.duration_ms = clock.elapsed().as_millis() as u64;
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// `(label, value)` rows for table renderers.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let c = &self.counters;
        vec![
            ("build id", self.build_id.to_string()),
            ("started", self.started_at.to_rfc3339()),
            ("seed", self.seed.to_string()),
            ("input bytes", self.input_bytes.to_string()),
            ("output bytes", self.output_bytes.to_string()),
            ("size ratio", format!("{:.2}", self.size_ratio)),
            ("duration", format!("{} ms", self.duration_ms)),
            ("chunks", self.chunk_count.to_string()),
            ("gaps", self.gaps.to_string()),
            ("identifiers renamed", c.identifiers_renamed.to_string()),
            ("locals declared", c.locals_declared.to_string()),
            ("strings encrypted", c.strings_encrypted.to_string()),
            ("numbers encoded", c.numbers_encoded.to_string()),
            ("booleans masked", c.booleans_masked.to_string()),
            ("garbage blocks", c.garbage_blocks.to_string()),
            ("anti-debug checks", c.anti_debug_checks.to_string()),
        ]
    }
}
