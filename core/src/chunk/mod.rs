//! Chunk scheduler and worker pool for oversized inputs.
//!
//! `splitter` cuts the input on statement boundaries, `pool` runs one
//! pipeline per chunk on a bounded set of threads and hands results back
//! in input order. Chunks share no compiler state: each gets its own
//! identifier aliases, constant pool and opcode map, and a local declared
//! in one chunk is not visible in the next.

pub mod cancel;
pub mod err;
pub mod pool;
pub mod splitter;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::ByteRange;

pub use cancel::CancellationToken;
pub use err::{CancelledError, ChunkProcessingError};
pub use pool::{ChunkOutcome, ChunkProcessor, PoolEvent, WorkerPool};
pub use splitter::{Chunk, split};

/// Inputs above this many bytes are chunked unless configured otherwise.
pub const DEFAULT_THRESHOLD: usize = 100 * 1024;
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub id: Uuid,
    pub index: usize,
    pub total: usize,
    pub range: ByteRange,
    /// sha1 of the chunk text, hex encoded.
    pub hash: String,
    /// Newlines in the input before `range.start`.
    pub line_offset: usize,
}

/// What a chunked job does when one chunk fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole job with a `ChunkProcessingError`.
    #[default]
    FailJob,
    /// Finish the job, leaving a marked gap for every failed chunk.
    ReportGaps,
}

/// A chunk that produced no output under `FailurePolicy::ReportGaps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkGap {
    pub index: usize,
    pub range: ByteRange,
    pub message: String,
}
