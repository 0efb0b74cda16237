//! file: core/src/pipeline.rs
//! description: drives a job from source text to the obfuscated program.
//!
//! Small inputs run the pipeline once and emit a standalone program.
//! Inputs above `chunking.threshold_bytes` are cut on statement boundaries
//! and every chunk runs the whole pipeline on the worker pool, emitting a
//! fragment. Fragments are joined in input order, each behind a marker
//! comment carrying its byte range. The last chunk is emitted as a program
//! so the script's return values still reach the caller, and fragments of
//! an isolated or sandboxed job share one environment table.
//!
//! Seeds: the job seed comes from the options or from entropy. A single
//! unit uses it directly; chunk `i` uses `derive_seed(job, i + 1)`. Inside
//! a unit, the compiler, the garbage injector and the code generator each
//! draw from their own derived stream, so a fixed seed reproduces a build.
//! The shared environment prelude of a chunked job draws from
//! `derive_seed(job, 0)`.

use std::{sync::Arc, time::Instant};

use serde::Serialize;

use crate::{
    ast,
    bytecode::{self, Build},
    chunk::{
        CancellationToken, CancelledError, Chunk, ChunkGap, ChunkMetadata, ChunkOutcome, PoolEvent, WorkerPool,
        split,
    },
    codegen::{self, CodegenOptions, EnvironmentMode, Form, Generated},
    error::ShroudResult,
    ir,
    metrics::{Metrics, PassCounters},
    options::ObfuscationOptions,
    passes::garbage::GarbageInjector,
    progress::{ChunkProgress, Monotonic, NoProgress, Phase, ProgressSink},
    rng::ShroudRng,
    script::Script,
};

/// Result of running the pipeline over one chunk.
#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    pub index: usize,
    pub fragment: String,
    pub counters: PassCounters,
}

/// Where each chunk landed in a chunked output.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub meta: ChunkMetadata,
    pub marker_bytes: usize,
    /// Zero for a gap.
    pub fragment_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ObfuscationResult {
    pub output: String,
    pub metrics: Metrics,
    /// Empty for single-unit jobs.
    pub chunks: Vec<ChunkReport>,
    /// Chunks left out under `FailurePolicy::ReportGaps`.
    pub gaps: Vec<ChunkGap>,
}

pub fn job_seed(options: &ObfuscationOptions) -> u64 {
    options.seed.unwrap_or_else(ShroudRng::entropy_seed)
}

pub fn chunk_seed(job_seed: u64, index: usize) -> u64 {
    ShroudRng::derive_seed(job_seed, index as u64 + 1)
}

/// Whether `script` goes through the chunk engine.
pub fn is_chunked(script: &Script, options: &ObfuscationOptions) -> bool {
    script.len() > options.chunking.threshold_bytes
}

/// First line of every chunked output.
pub fn chunked_header(total: usize, input_bytes: usize) -> String {
    format!("-- shroud: {} chunks, {} input bytes\n", total, input_bytes)
}

pub fn boundary_marker(meta: &ChunkMetadata) -> String {
    format!("-- chunk {}/{} bytes {}..{} sha1 {}\n", meta.index + 1, meta.total, meta.range.start, meta.range.end, meta.hash)
}

pub fn gap_marker(meta: &ChunkMetadata, message: &str) -> String {
    let message: String = message.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }).collect();
    format!(
        "-- GAP: chunk {}/{} bytes {}..{} was not obfuscated: {}\n",
        meta.index + 1,
        meta.total,
        meta.range.start,
        meta.range.end,
        message
    )
}

/// Parse, lower, compile and inject garbage. This is the build the code
/// generator would embed.
pub fn build_unit(script: &Script, options: &ObfuscationOptions, seed: u64) -> ShroudResult<Build> {
    build_with_phases(script, options, seed, &mut |_| Ok(()))
}

fn build_with_phases(
    script: &Script,
    options: &ObfuscationOptions,
    seed: u64,
    phase: &mut dyn FnMut(Phase) -> ShroudResult<()>,
) -> ShroudResult<Build> {
    phase(Phase::Parsing)?;
    let tree = ast::parse(script)?;
    phase(Phase::Lowering)?;
    let lowered = ir::lower_ast_to_ir(&tree, options.flatten_control_flow)?;
    phase(Phase::Compiling)?;
    let mut build =
        bytecode::compile(&lowered, options.compile_settings(), ShroudRng::new(ShroudRng::derive_seed(seed, 0)))?;
    phase(Phase::Injecting)?;
    let mut rng = ShroudRng::new(ShroudRng::derive_seed(seed, 1));
    GarbageInjector::new(options.garbage_density).inject(&mut build, &mut rng)?;
    Ok(build)
}

fn emit_unit(build: &Build, options: &CodegenOptions, seed: u64) -> ShroudResult<Generated> {
    let mut rng = ShroudRng::new(ShroudRng::derive_seed(seed, 2));
    codegen::generate(build, options, &mut rng)
}

/// Codegen settings for chunk `index` of `total`.
fn chunk_codegen_options(options: &ObfuscationOptions, index: usize, total: usize) -> CodegenOptions {
    let form = if index + 1 == total { Form::Program } else { Form::Fragment };
    CodegenOptions {
        shared_environment: options.environment != EnvironmentMode::Passthrough,
        ..options.codegen_options(form)
    }
}

/// Builds for every unit of `script`, in order, as `obfuscate` would
/// compile them with the same seed.
pub fn compile_builds(script: &Script, options: &ObfuscationOptions, seed: u64) -> ShroudResult<Vec<Build>> {
    options.validate()?;
    if !is_chunked(script, options) {
        return Ok(vec![build_unit(script, options, seed)?]);
    }
    let statements = ast::top_level_statements(script)?;
    split(script, &statements, options.chunking.effective_chunk_size())
        .iter()
        .map(|chunk| build_unit(&chunk.script, options, chunk_seed(seed, chunk.meta.index)))
        .collect()
}

/// Convenience wrapper: obfuscate `source` with no progress reporting.
pub fn obfuscate_source(name: &str, source: &str, options: &ObfuscationOptions) -> ShroudResult<String> {
    let script = Script::from_source(name, source);
    Ok(obfuscate(&script, options, &mut NoProgress, &CancellationToken::new())?.output)
}

pub fn obfuscate(
    script: &Script,
    options: &ObfuscationOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancellationToken,
) -> ShroudResult<ObfuscationResult> {
    options.validate()?;
    let seed = job_seed(options);
    let mut metrics = Metrics::start(script.len(), seed);
    let mut progress = Monotonic::new(progress);
    log::info!("obfuscating {} ({} bytes, seed {})", script.name, script.len(), seed);

    if cancel.is_cancelled() {
        return Err(CancelledError::job().boxed());
    }
    let mut result = if is_chunked(script, options) {
        obfuscate_chunked(script, options, seed, metrics.clone(), &mut progress, cancel)?
    } else {
        let build = build_with_phases(script, options, seed, &mut |phase| {
            if cancel.is_cancelled() {
                return Err(CancelledError::job().boxed());
            }
            log::debug!("{}: {}", script.name, phase);
            progress.emit(single_unit_percent(phase), phase, None);
            Ok(())
        })?;
        if cancel.is_cancelled() {
            return Err(CancelledError::job().boxed());
        }
        progress.emit(single_unit_percent(Phase::Generating), Phase::Generating, None);
        let generated = emit_unit(&build, &options.codegen_options(Form::Program), seed)?;
        metrics.counters = PassCounters::from_build(&build.stats, &generated);
        ObfuscationResult { output: generated.source, metrics, chunks: Vec::new(), gaps: Vec::new() }
    };

    result.metrics.finish(result.output.len());
    progress.emit(100.0, Phase::Done, None);
    log::info!(
        "finished {}: {} -> {} bytes in {} ms",
        script.name,
        result.metrics.input_bytes,
        result.metrics.output_bytes,
        result.metrics.duration_ms
    );
    Ok(result)
}

fn single_unit_percent(phase: Phase) -> f64 {
    match phase {
        Phase::Parsing => 5.0,
        Phase::Lowering => 20.0,
        Phase::Compiling => 35.0,
        Phase::Injecting => 60.0,
        Phase::Generating => 75.0,
        _ => 100.0,
    }
}

fn obfuscate_chunked(
    script: &Script,
    options: &ObfuscationOptions,
    seed: u64,
    mut metrics: Metrics,
    progress: &mut Monotonic<'_>,
    cancel: &CancellationToken,
) -> ShroudResult<ObfuscationResult> {
    progress.emit(1.0, Phase::Splitting, None);
    let statements = ast::top_level_statements(script)?;
    let chunks = split(script, &statements, options.chunking.effective_chunk_size());
    let total = chunks.len();
    log::info!(
        "{}: {} chunks of ~{} bytes on {} workers",
        script.name,
        total,
        options.chunking.effective_chunk_size(),
        options.chunking.workers
    );

    let unit_options = options.clone();
    let processor = Arc::new(move |chunk: &Chunk| -> ShroudResult<ProcessedChunk> {
        let seed = chunk_seed(seed, chunk.meta.index);
        let build = build_unit(&chunk.script, &unit_options, seed)?;
        let codegen_options = chunk_codegen_options(&unit_options, chunk.meta.index, chunk.meta.total);
        let generated = emit_unit(&build, &codegen_options, seed)?;
        Ok(ProcessedChunk {
            index: chunk.meta.index,
            counters: PassCounters::from_build(&build.stats, &generated),
            fragment: generated.source,
        })
    });

    let started = Instant::now();
    let pool = WorkerPool::new(options.chunking.workers, options.chunking.failure_policy);
    let outcomes = pool.run(chunks, processor, cancel, |event: &PoolEvent| {
        let fraction = event.bytes_processed as f64 / event.bytes_total.max(1) as f64;
        let eta_ms = (event.bytes_processed > 0).then(|| {
            let elapsed = started.elapsed().as_millis() as f64;
            (elapsed * (event.bytes_total - event.bytes_processed) as f64 / event.bytes_processed as f64) as u64
        });
        progress.emit(
            2.0 + 93.0 * fraction,
            Phase::Processing,
            Some(ChunkProgress {
                chunks_total: event.chunks_total,
                chunks_processed: event.chunks_processed,
                bytes_total: event.bytes_total,
                bytes_processed: event.bytes_processed,
                eta_ms,
                active_workers: event.active_workers,
            }),
        );
    })?;

    progress.emit(96.0, Phase::Assembling, None);
    let mut output = chunked_header(total, script.len());
    if options.environment != EnvironmentMode::Passthrough {
        let mut rng = ShroudRng::new(ShroudRng::derive_seed(seed, 0));
        output.push_str(&codegen::shared_environment_prelude(options.dialect, options.environment, &mut rng));
    }
    let mut reports = Vec::with_capacity(total);
    let mut gaps = Vec::new();
    for (meta, outcome) in outcomes {
        match outcome {
            ChunkOutcome::Done(processed) => {
                let marker = boundary_marker(&meta);
                output.push_str(&marker);
                output.push_str(&processed.fragment);
                metrics.counters.merge(&processed.counters);
                reports.push(ChunkReport { marker_bytes: marker.len(), fragment_bytes: processed.fragment.len(), meta });
            }
            ChunkOutcome::Failed(error) => {
                let marker = gap_marker(&meta, &error.message());
                log::warn!("{}: leaving a gap for chunk {} {}", script.name, meta.index, meta.range);
                output.push_str(&marker);
                gaps.push(ChunkGap { index: meta.index, range: meta.range, message: error.message() });
                reports.push(ChunkReport { marker_bytes: marker.len(), fragment_bytes: 0, meta });
            }
        }
    }
    metrics.chunk_count = total;
    metrics.gaps = gaps.len();
    Ok(ObfuscationResult { output, metrics, chunks: reports, gaps })
}
