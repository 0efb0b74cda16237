//! Cuts oversized input into byte-range chunks.
//!
//! Cuts only fall on top-level statement boundaries, so every chunk parses
//! on its own, and never after a sealed statement, so every chunk keeps the
//! locals and the early exits it depends on. Ranges are contiguous and
//! cover the whole input: a chunk owns everything from the previous cut up
//! to the end of the first unsealed statement that carried it past the
//! target size.

use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::{ast::TopLevelStatement, location::ByteRange, script::Script};

use super::ChunkMetadata;

/// One unit of work for the pool.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub meta: ChunkMetadata,
    pub script: Script,
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cut points for `len` bytes given the statement ranges, aiming for
/// `chunk_size` bytes per chunk.
pub fn plan_ranges(len: usize, statements: &[TopLevelStatement], chunk_size: usize) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    // The last statement never closes a chunk, so trailing text stays with it.
    let cuttable = statements.len().saturating_sub(1);
    for statement in statements[..cuttable].iter().filter(|s| !s.sealed) {
        let end = statement.range.end;
        if end.saturating_sub(start) >= chunk_size && end < len {
            ranges.push(ByteRange::new(start, end));
            start = end;
        }
    }
    if start < len || ranges.is_empty() {
        ranges.push(ByteRange::new(start, len));
    }
    ranges
}

/// Split `script` along `statements`. Each chunk is a standalone script
/// named after its source and index.
pub fn split(script: &Script, statements: &[TopLevelStatement], chunk_size: usize) -> Vec<Chunk> {
    let ranges = plan_ranges(script.len(), statements, chunk_size);
    let total = ranges.len();
    let mut line_offset = 0;
    ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let text = range.slice(&script.content);
            let lines = line_offset;
            line_offset += text.matches('\n').count();
            Chunk {
                meta: ChunkMetadata {
                    id: Uuid::new_v4(),
                    index,
                    total,
                    range,
                    hash: content_hash(text),
                    line_offset: lines,
                },
                script: Script::from_source(format!("{}#{}", script.name, index), text),
            }
        })
        .collect()
}
