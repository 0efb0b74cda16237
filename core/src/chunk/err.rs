use crate::{
    error::{ErrorKind, Level, ShroudErrorExt, diagnostic_error},
    location::Location,
};

use super::ChunkMetadata;

diagnostic_error!(
    /// The job was cancelled through its `CancellationToken`. Not a failure.
    CancelledError,
    ErrorKind::Cancelled,
    "Obfuscation job cancelled."
);

impl CancelledError {
    pub fn job() -> Self {
        CancelledError::new("shroud.chunk.pool".into(), None, None)
    }
}

diagnostic_error!(
    /// A chunked job could not produce complete output.
    ChunkProcessingError,
    ErrorKind::ChunkProcessing,
    "Chunk processing failed."
);

impl ChunkProcessingError {
    /// Wrap the error a chunk failed with. The inner location is mapped
    /// back onto the full input.
    pub fn wrap(meta: &ChunkMetadata, inner: &dyn ShroudErrorExt) -> Self {
        let location = inner.location().map(|loc| {
            let file = loc.file.rsplit_once('#').map(|(name, _)| name.to_string()).unwrap_or(loc.file.clone());
            Location::new(file, loc.line, loc.column).offset_lines(meta.line_offset)
        });
        ChunkProcessingError::with(
            Level::Error,
            format!(
                "chunk {}/{} {} failed: [{}] {}",
                meta.index + 1,
                meta.total,
                meta.range,
                inner.kind(),
                inner.message()
            ),
            "shroud.chunk.pool".into(),
            location,
            None,
        )
    }

    pub fn panicked() -> Self {
        ChunkProcessingError::with(
            Level::Critical,
            "a chunk worker panicked".into(),
            "shroud.chunk.pool".into(),
            None,
            None,
        )
    }

    pub fn lost(missing: usize) -> Self {
        ChunkProcessingError::with(
            Level::Critical,
            format!("{} chunks produced no result", missing),
            "shroud.chunk.pool".into(),
            None,
            None,
        )
    }
}
