use futures::{StreamExt, executor::block_on};
use shroud_core::{
    ast,
    chunk::{CancellationToken, FailurePolicy},
    error::ErrorKind,
    options::ObfuscationOptions,
    pipeline::{chunked_header, compile_builds, obfuscate, obfuscate_source},
    progress::{ChannelSink, NoProgress, Phase, Progress},
    codegen::{EnvironmentMode, runtime::SHARED_ENVIRONMENT},
    script::Script,
    vm::Vm,
};

fn small_chunks(mut options: ObfuscationOptions) -> ObfuscationOptions {
    options.chunking.threshold_bytes = 256;
    options.chunking.chunk_size = Some(128);
    options.chunking.workers = 3;
    options
}

fn many_prints(count: usize) -> String {
    (0..count).map(|i| format!("print(\"line {}\")\n", i)).collect()
}

#[test]
fn single_unit_output_and_metrics() {
    let mut options = ObfuscationOptions::default();
    options.seed = Some(21);
    let script = Script::from_source("hello.lua", "local who = 'world'\nprint('hello ' .. who)\n");
    let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate");

    assert!(result.output.starts_with("return (function(...)"));
    assert!(result.chunks.is_empty());
    assert!(result.gaps.is_empty());
    let m = &result.metrics;
    assert_eq!(m.seed, 21);
    assert_eq!(m.input_bytes, script.len());
    assert_eq!(m.output_bytes, result.output.len());
    assert_eq!(m.chunk_count, 1);
    assert!(m.size_ratio > 1.0);
    assert!(m.counters.strings_encrypted >= 2);
    assert!(m.counters.identifiers_renamed > 0);
    assert_eq!(m.counters.locals_declared, 1);

    let json: serde_json::Value = serde_json::from_str(&m.to_json()).expect("metrics json");
    assert_eq!(json["seed"], 21);
    assert_eq!(json["chunk_count"], 1);
    assert!(json["build_id"].is_string());
    assert!(json["strings_encrypted"].is_number());
}

#[test]
fn fixed_seed_reproduces_the_output() {
    let mut options = ObfuscationOptions::maximum();
    options.seed = Some(1234);
    let a = obfuscate_source("same.lua", "x = 1\nprint(x + 2)", &options).expect("first");
    let b = obfuscate_source("same.lua", "x = 1\nprint(x + 2)", &options).expect("second");
    assert_eq!(a, b);
    options.seed = Some(1235);
    assert_ne!(obfuscate_source("same.lua", "x = 1\nprint(x + 2)", &options).expect("third"), a);
}

#[test]
fn progress_never_goes_backwards() {
    let mut options = small_chunks(ObfuscationOptions::default());
    options.seed = Some(3);
    for source in ["print(1)\n".to_string(), many_prints(60)] {
        let script = Script::from_source("progress.lua", source);
        let mut seen: Vec<Progress> = Vec::new();
        let mut sink = |p: &Progress| seen.push(p.clone());
        obfuscate(&script, &options, &mut sink, &CancellationToken::new()).expect("obfuscate");

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
        let last = seen.last().expect("final report");
        assert_eq!(last.phase, Phase::Done);
        assert_eq!(last.percent, 100.0);
    }
}

#[test]
fn chunked_progress_carries_chunk_counters() {
    let mut options = small_chunks(ObfuscationOptions::minimal());
    options.seed = Some(4);
    let script = Script::from_source("counters.lua", many_prints(40));
    let (mut sink, receiver) = ChannelSink::channel();
    let result = obfuscate(&script, &options, &mut sink, &CancellationToken::new()).expect("obfuscate");
    drop(sink);

    let reports: Vec<Progress> = block_on(receiver.collect());
    let chunk_reports: Vec<_> = reports.iter().filter_map(|p| p.chunks.clone()).collect();
    assert_eq!(chunk_reports.len(), result.metrics.chunk_count);
    let last = chunk_reports.last().expect("chunk progress");
    assert_eq!(last.chunks_processed, last.chunks_total);
    assert_eq!(last.bytes_processed, script.len());
    assert!(reports.iter().any(|p| p.phase == Phase::Assembling));
}

#[test]
fn chunked_output_is_ordered_and_runs_like_the_input() {
    let mut options = small_chunks(ObfuscationOptions::default());
    options.seed = Some(8);
    let source = many_prints(50);
    let script = Script::from_source("ordered.lua", source);
    let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate");

    assert!(result.chunks.len() > 3);
    assert!(result.output.starts_with(&chunked_header(result.chunks.len(), script.len())));
    let mut last_marker = 0;
    for (i, report) in result.chunks.iter().enumerate() {
        assert_eq!(report.meta.index, i);
        let marker = format!("-- chunk {}/{} bytes {}..{}", i + 1, result.chunks.len(), report.meta.range.start, report.meta.range.end);
        let at = result.output.find(&marker).unwrap_or_else(|| panic!("missing marker {}", marker));
        assert!(at >= last_marker);
        last_marker = at;
    }
    assert_eq!(result.output.matches("do (function(...)").count(), result.chunks.len() - 1);
    assert_eq!(result.output.matches("return (function(...)").count(), 1);
    let tail = result.output.rfind("return (function(...)").expect("tail chunk");
    assert!(tail > last_marker);

    // Running every chunk build in order prints what the input prints.
    let mut vm = Vm::new();
    for build in compile_builds(&script, &options, 8).expect("builds") {
        vm.run(&build).expect("run chunk");
    }
    let expected: String = (0..50).map(|i| format!("line {}\n", i)).collect();
    assert_eq!(vm.take_output(), expected);
}

#[test]
fn chunking_keeps_top_level_locals_and_the_final_return() {
    let mut source = String::from("local total = 0\n");
    source.push_str(&(1..=30).map(|i| format!("total = total + {}\n", i)).collect::<String>());
    source.push_str("print(total)\n");
    source.push_str("result = total\n");
    source.push_str(&many_prints(30));
    source.push_str("if result > 0 then return result end\n");
    source.push_str("print('unreachable')\n");
    let mut options = small_chunks(ObfuscationOptions::default());
    options.seed = Some(12);
    let script = Script::from_source("locals.lua", source);

    let statements = ast::top_level_statements(&script).expect("statements");
    assert!(statements[..32].iter().all(|s| s.sealed));
    assert!(!statements[32].sealed);
    assert!(statements[statements.len() - 2..].iter().all(|s| s.sealed));

    let builds = compile_builds(&script, &options, 12).expect("builds");
    assert!(builds.len() > 2);
    let mut vm = Vm::new();
    let mut returned = Vec::new();
    for build in &builds {
        returned = vm.run(build).expect("run chunk");
    }
    let expected: String = std::iter::once("465\n".to_string()).chain((0..30).map(|i| format!("line {}\n", i))).collect();
    assert_eq!(vm.take_output(), expected);
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].to_string(), "465");
}

#[test]
fn isolated_chunks_share_one_environment() {
    let mut options = small_chunks(ObfuscationOptions::default());
    options.environment = EnvironmentMode::Isolated;
    options.seed = Some(5);
    let script = Script::from_source("isolated.lua", many_prints(40));
    let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate");

    assert!(result.chunks.len() > 2);
    assert_eq!(result.output.matches(&format!("local {}\n", SHARED_ENVIRONMENT)).count(), 1);
    assert_eq!(result.output.matches("setmetatable({}, {__index =").count(), 1);
    assert!(result.output.find(SHARED_ENVIRONMENT) < result.output.find("-- chunk 1/"));
}

#[test]
fn failing_chunk_fails_the_job_with_mapped_location() {
    let mut source = many_prints(30);
    source.push_str("for i = 1, 2 do print(i) end\n");
    source.push_str(&many_prints(10));
    let options = small_chunks(ObfuscationOptions::minimal());
    let script = Script::from_source("failing.lua", source);

    let err = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).err().expect("must fail");
    assert_eq!(err.kind(), ErrorKind::ChunkProcessing);
    assert!(err.message().contains("[unsupported]"), "{}", err.message());
    let loc = err.location().expect("location");
    assert_eq!(loc.file, "failing.lua");
    assert_eq!(loc.line, 31);
}

#[test]
fn report_gaps_marks_the_missing_range() {
    let mut source = many_prints(30);
    source.push_str("repeat x = 1 until x\n");
    source.push_str(&many_prints(10));
    let mut options = small_chunks(ObfuscationOptions::minimal());
    options.chunking.failure_policy = FailurePolicy::ReportGaps;
    let script = Script::from_source("gaps.lua", source);

    let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("partial result");
    assert_eq!(result.gaps.len(), 1);
    assert_eq!(result.metrics.gaps, 1);
    let gap = &result.gaps[0];
    assert!(gap.message.contains("repeat"));
    assert!(result.output.contains(&format!("-- GAP: chunk {}/", gap.index + 1)));
    assert!(result.output.contains(&format!("bytes {}..{} was not obfuscated", gap.range.start, gap.range.end)));
    let report = &result.chunks[gap.index];
    assert_eq!(report.fragment_bytes, 0);
}

#[test]
fn cancelled_job_is_not_a_failure() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let script = Script::from_source("cancel.lua", "print(1)");
    let err = obfuscate(&script, &ObfuscationOptions::default(), &mut NoProgress, &cancel).err().expect("cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let big = Script::from_source("cancel_big.lua", many_prints(40));
    let options = small_chunks(ObfuscationOptions::default());
    let err = obfuscate(&big, &options, &mut NoProgress, &cancel).err().expect("cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn invalid_options_are_rejected_before_work() {
    let mut options = ObfuscationOptions::default();
    options.garbage_density = 1.5;
    let err = obfuscate_source("x.lua", "print(1)", &options).err().expect("invalid");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn syntax_errors_surface_unchanged_for_small_inputs() {
    let err = obfuscate_source("bad.lua", "print(", &ObfuscationOptions::default()).err().expect("syntax error");
    assert_eq!(err.kind(), ErrorKind::Parse);
}
