//! Progress reporting.
//!
//! A job reports through a `ProgressSink`. Closures implement it, and
//! `ChannelSink` wraps a `futures` unbounded sender so a UI can consume
//! progress as a stream. Percentages a sink sees never go down.

use std::fmt;

use futures::channel::mpsc::UnboundedSender;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parsing,
    Lowering,
    Compiling,
    Injecting,
    Generating,
    Splitting,
    Processing,
    Assembling,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parsing => "parsing",
            Phase::Lowering => "lowering",
            Phase::Compiling => "compiling",
            Phase::Injecting => "injecting garbage",
            Phase::Generating => "generating VM",
            Phase::Splitting => "splitting",
            Phase::Processing => "processing chunks",
            Phase::Assembling => "assembling",
            Phase::Done => "done",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkProgress {
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub bytes_total: usize,
    pub bytes_processed: usize,
    pub eta_ms: Option<u64>,
    pub active_workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// 0 to 100.
    pub percent: f64,
    pub phase: Phase,
    pub chunks: Option<ChunkProgress>,
}

pub trait ProgressSink {
    fn report(&mut self, progress: &Progress);
}

impl<F: FnMut(&Progress)> ProgressSink for F {
    fn report(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Forwards every report into a `futures` unbounded channel.
pub struct ChannelSink(pub UnboundedSender<Progress>);

impl ChannelSink {
    /// A sink plus the stream end of its channel.
    pub fn channel() -> (Self, futures::channel::mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        (ChannelSink(tx), rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&mut self, progress: &Progress) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.0.unbounded_send(progress.clone());
    }
}

/// Sink that discards everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: &Progress) {}
}

/// Clamps what reaches the sink so percentages never decrease.
pub(crate) struct Monotonic<'a> {
    sink: &'a mut dyn ProgressSink,
    last: f64,
}

impl<'a> Monotonic<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Monotonic { sink, last: 0.0 }
    }

    pub fn emit(&mut self, percent: f64, phase: Phase, chunks: Option<ChunkProgress>) {
        let percent = percent.clamp(0.0, 100.0).max(self.last);
        self.last = percent;
        self.sink.report(&Progress { percent, phase, chunks });
    }
}
