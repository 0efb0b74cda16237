//! file: core/src/chunk/pool.rs
//! description: bounded worker pool running one processor call per chunk.
//!
//! Chunks wait in a `Mutex<VecDeque>`; each worker pops the next one when
//! it is idle, so a chunk is owned by exactly one worker. Results travel
//! back on an `mpsc` channel in completion order and are sorted by index
//! before they are returned. Cancellation and fail-fast are both checked
//! only before a worker takes its next chunk.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use crate::{
    error::{ShroudErrorExt, ShroudResult},
    location::ByteRange,
};

use super::{
    CancellationToken, CancelledError, ChunkMetadata, ChunkProcessingError, FailurePolicy, splitter::Chunk,
};

/// Work run for every chunk. Implemented for plain closures.
pub trait ChunkProcessor<T>: Send + Sync {
    fn process(&self, chunk: &Chunk) -> ShroudResult<T>;
}

impl<T, F> ChunkProcessor<T> for F
where
    F: Fn(&Chunk) -> ShroudResult<T> + Send + Sync,
{
    fn process(&self, chunk: &Chunk) -> ShroudResult<T> {
        self(chunk)
    }
}

pub enum ChunkOutcome<T> {
    Done(T),
    Failed(Box<dyn ShroudErrorExt>),
}

impl<T> ChunkOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, ChunkOutcome::Done(_))
    }
}

/// Snapshot reported after each chunk completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    pub index: usize,
    pub range: ByteRange,
    pub succeeded: bool,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub bytes_total: usize,
    pub bytes_processed: usize,
    pub active_workers: usize,
}

struct Message<T> {
    meta: ChunkMetadata,
    result: ShroudResult<T>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    policy: FailurePolicy,
}

impl WorkerPool {
    pub fn new(workers: usize, policy: FailurePolicy) -> Self {
        WorkerPool { workers: workers.max(1), policy }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every chunk and return outcomes in index order.
    ///
    /// Under `FailJob` the first failure stops dispatch and is returned as a
    /// `ChunkProcessingError`. Under `ReportGaps` failures come back as
    /// `ChunkOutcome::Failed`. A cancelled job that left chunks unprocessed
    /// returns `CancelledError`.
    pub fn run<T, P>(
        &self,
        chunks: Vec<Chunk>,
        processor: Arc<P>,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(&PoolEvent),
    ) -> ShroudResult<Vec<(ChunkMetadata, ChunkOutcome<T>)>>
    where
        T: Send + 'static,
        P: ChunkProcessor<T> + 'static,
    {
        let chunks_total = chunks.len();
        let bytes_total: usize = chunks.iter().map(|c| c.meta.range.len()).sum();
        let queue = Arc::new(Mutex::new(chunks.into_iter().collect::<VecDeque<_>>()));
        let abort = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<Message<T>>();

        let spawned = self.workers.min(chunks_total.max(1));
        log::debug!("starting {} workers for {} chunks", spawned, chunks_total);
        let handles: Vec<_> = (0..spawned)
            .map(|_| {
                let queue = queue.clone();
                let abort = abort.clone();
                let active = active.clone();
                let processor = processor.clone();
                let cancel = cancel.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    loop {
                        if cancel.is_cancelled() || abort.load(Ordering::SeqCst) {
                            break;
                        }
                        let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                        let Some(chunk) = next else { break };
                        active.fetch_add(1, Ordering::SeqCst);
                        let result = processor.process(&chunk);
                        active.fetch_sub(1, Ordering::SeqCst);
                        if tx.send(Message { meta: chunk.meta, result }).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(tx);

        let mut outcomes = Vec::with_capacity(chunks_total);
        let mut failure: Option<Box<dyn ShroudErrorExt>> = None;
        let mut bytes_processed = 0;
        for message in rx {
            bytes_processed += message.meta.range.len();
            let succeeded = message.result.is_ok();
            let event = PoolEvent {
                index: message.meta.index,
                range: message.meta.range,
                succeeded,
                chunks_total,
                chunks_processed: outcomes.len() + 1,
                bytes_total,
                bytes_processed,
                active_workers: active.load(Ordering::SeqCst),
            };
            match message.result {
                Ok(value) => outcomes.push((message.meta, ChunkOutcome::Done(value))),
                Err(e) => {
                    log::warn!("chunk {} {} failed: {}", message.meta.index, message.meta.range, e.message());
                    if self.policy == FailurePolicy::FailJob {
                        abort.store(true, Ordering::SeqCst);
                        if failure.is_none() {
                            failure = Some(ChunkProcessingError::wrap(&message.meta, e.as_ref()).boxed());
                        }
                    }
                    outcomes.push((message.meta, ChunkOutcome::Failed(e)));
                }
            }
            on_event(&event);
        }

        for handle in handles {
            if handle.join().is_err() && failure.is_none() {
                failure = Some(ChunkProcessingError::panicked().boxed());
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if outcomes.len() < chunks_total {
            if cancel.is_cancelled() {
                log::info!("job cancelled after {} of {} chunks", outcomes.len(), chunks_total);
                return Err(CancelledError::job().boxed());
            }
            return Err(ChunkProcessingError::lost(chunks_total - outcomes.len()).boxed());
        }
        outcomes.sort_by_key(|(meta, _)| meta.index);
        Ok(outcomes)
    }
}
