use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use shroud_core::{
    ast::{self, TopLevelStatement},
    bytecode::{CompileError, Opcode},
    chunk::{
        CancellationToken, Chunk, ChunkOutcome, FailurePolicy, PoolEvent, WorkerPool,
        splitter::{content_hash, plan_ranges, split},
    },
    error::{ErrorKind, ShroudResult},
    location::ByteRange,
    script::Script,
};

/// `count` one-line statements of roughly equal size.
fn statements_script(count: usize) -> Script {
    let src: String = (0..count).map(|i| format!("value_{:04} = {}\n", i, i)).collect();
    Script::from_source("big.lua", src)
}

fn chunks_of(script: &Script, chunk_size: usize) -> Vec<Chunk> {
    let statements = ast::top_level_statements(script).expect("top-level statements");
    split(script, &statements, chunk_size)
}

#[test]
fn ranges_are_contiguous_and_cover_the_input() {
    let script = statements_script(200);
    let chunks = chunks_of(&script, 256);
    assert!(chunks.len() > 5);
    let mut expected_start = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.meta.index, i);
        assert_eq!(chunk.meta.total, chunks.len());
        assert_eq!(chunk.meta.range.start, expected_start);
        assert_eq!(chunk.meta.hash, content_hash(&chunk.script.content));
        assert_eq!(chunk.script.content, chunk.meta.range.slice(&script.content));
        expected_start = chunk.meta.range.end;
    }
    assert_eq!(expected_start, script.len());
    let rebuilt: String = chunks.iter().map(|c| c.script.content.as_str()).collect();
    assert_eq!(rebuilt, script.content);
}

#[test]
fn every_chunk_parses_on_its_own() {
    let script = statements_script(120);
    for chunk in chunks_of(&script, 300) {
        ast::parse(&chunk.script).unwrap_or_else(|e| panic!("chunk {} failed: {:?}", chunk.meta.index, e));
        assert!(chunk.script.name.starts_with("big.lua#"));
    }
}

#[test]
fn line_offsets_count_preceding_newlines() {
    let script = statements_script(50);
    let chunks = chunks_of(&script, 100);
    for chunk in &chunks {
        let before = &script.content[..chunk.meta.range.start];
        assert_eq!(chunk.meta.line_offset, before.matches('\n').count());
    }
}

#[test]
fn small_inputs_stay_whole() {
    let whole = [TopLevelStatement::new(ByteRange::new(0, 10), false)];
    assert_eq!(plan_ranges(10, &whole, 100), vec![ByteRange::new(0, 10)]);
    assert_eq!(plan_ranges(0, &[], 100), vec![ByteRange::new(0, 0)]);
}

#[test]
fn sealed_statements_never_close_a_chunk() {
    let statements: Vec<TopLevelStatement> =
        (0..6).map(|i| TopLevelStatement::new(ByteRange::new(i * 10, i * 10 + 10), (1..4).contains(&i))).collect();
    assert_eq!(
        plan_ranges(60, &statements, 5),
        vec![ByteRange::new(0, 10), ByteRange::new(10, 50), ByteRange::new(50, 60)]
    );
}

#[test]
fn top_level_locals_stay_with_their_readers() {
    let mut src = String::from("local greeting = 'hi'\n");
    src.push_str(&(0..40).map(|i| format!("filler_{:02} = {}\n", i, i)).collect::<String>());
    src.push_str("print(greeting)\n");
    src.push_str(&(0..40).map(|i| format!("after_{:02} = {}\n", i, i)).collect::<String>());
    let script = Script::from_source("locals.lua", src);

    let statements = ast::top_level_statements(&script).expect("statements");
    let reader = statements.iter().position(|s| s.range.slice(&script.content) == "print(greeting)").expect("reader");
    assert!(statements[..reader].iter().all(|s| s.sealed));
    assert!(statements[reader..].iter().all(|s| !s.sealed));

    let chunks = chunks_of(&script, 64);
    assert!(chunks.len() > 2);
    assert!(chunks[0].script.content.contains("local greeting") && chunks[0].script.content.contains("print(greeting)"));
}

#[test]
fn a_local_seals_only_up_to_its_last_reader() {
    let script = Script::from_source("own.lua", "local a = 1 print(a)\nb = 2\nc = 3\n");
    let statements = ast::top_level_statements(&script).expect("statements");
    assert_eq!(statements.len(), 4);
    assert!(statements[0].sealed);
    assert!(statements[1..].iter().all(|s| !s.sealed));
}

#[test]
fn everything_from_an_early_return_on_is_one_chunk() {
    let mut src: String = (0..30).map(|i| format!("print({})\n", i)).collect();
    src.push_str("if done then return 'early' end\n");
    src.push_str(&(30..60).map(|i| format!("print({})\n", i)).collect::<String>());
    let script = Script::from_source("early.lua", src);

    let chunks = chunks_of(&script, 40);
    let last = chunks.last().expect("chunks");
    assert!(chunks.len() > 2);
    assert!(last.script.content.contains("if done then return 'early' end"), "{}", last.script.content);
    assert!(last.script.content.ends_with("print(59)\n"));
    assert!(chunks[..chunks.len() - 1].iter().all(|c| !c.script.content.contains("return")));
}

#[test]
fn returns_inside_function_bodies_do_not_seal() {
    let script = Script::from_source("fn.lua", "f = function() return 1 end\nprint(f())\nx = 1\n");
    let statements = ast::top_level_statements(&script).expect("statements");
    assert!(statements.iter().all(|s| !s.sealed));
}

#[test]
fn results_come_back_in_input_order() {
    let script = statements_script(100);
    let chunks = chunks_of(&script, 200);
    let total = chunks.len();
    assert!(total >= 5);

    // Later chunks finish first.
    let processor = Arc::new(move |chunk: &Chunk| -> ShroudResult<usize> {
        thread::sleep(Duration::from_millis(((total - chunk.meta.index) * 3) as u64));
        Ok(chunk.meta.index)
    });
    let mut completion = Vec::new();
    let outcomes = WorkerPool::new(4, FailurePolicy::FailJob)
        .run(chunks, processor, &CancellationToken::new(), |event: &PoolEvent| completion.push(event.index))
        .expect("pool run");

    assert_eq!(completion.len(), total);
    let indices: Vec<usize> = outcomes.iter().map(|(meta, _)| meta.index).collect();
    assert_eq!(indices, (0..total).collect::<Vec<_>>());
    for (meta, outcome) in &outcomes {
        match outcome {
            ChunkOutcome::Done(value) => assert_eq!(*value, meta.index),
            ChunkOutcome::Failed(e) => panic!("chunk {} failed: {:?}", meta.index, e),
        }
    }
}

#[test]
fn progress_events_are_cumulative() {
    let script = statements_script(80);
    let chunks = chunks_of(&script, 150);
    let total = chunks.len();
    let processor = Arc::new(|chunk: &Chunk| -> ShroudResult<usize> { Ok(chunk.script.len()) });
    let mut events: Vec<PoolEvent> = Vec::new();
    WorkerPool::new(3, FailurePolicy::FailJob)
        .run(chunks, processor, &CancellationToken::new(), |event: &PoolEvent| events.push(event.clone()))
        .expect("pool run");

    assert_eq!(events.len(), total);
    for (n, event) in events.iter().enumerate() {
        assert_eq!(event.chunks_processed, n + 1);
        assert_eq!(event.chunks_total, total);
        assert!(event.succeeded);
        assert!(event.active_workers <= 3);
    }
    let last = events.last().expect("events");
    assert_eq!(last.bytes_processed, last.bytes_total);
    assert_eq!(last.bytes_total, script.len());
}

#[test]
fn cancellation_stops_dispatch() {
    let script = statements_script(100);
    let chunks = chunks_of(&script, 200);
    let total = chunks.len();
    let cancel = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let token = cancel.clone();
    let record = seen.clone();
    let processor = Arc::new(move |chunk: &Chunk| -> ShroudResult<()> {
        record.lock().expect("lock").push(chunk.meta.index);
        if chunk.meta.index == 2 {
            token.cancel();
        }
        Ok(())
    });
    let err = WorkerPool::new(1, FailurePolicy::FailJob)
        .run(chunks, processor, &cancel, |_: &PoolEvent| {})
        .err()
        .expect("cancelled");

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let seen = seen.lock().expect("lock");
    assert_eq!(*seen, vec![0, 1, 2]);
    assert!(seen.len() < total);
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let script = statements_script(40);
    let chunks = chunks_of(&script, 100);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let processor = Arc::new(move |_: &Chunk| -> ShroudResult<()> {
        *counter.lock().expect("lock") += 1;
        Ok(())
    });
    let err = WorkerPool::new(4, FailurePolicy::ReportGaps)
        .run(chunks, processor, &cancel, |_: &PoolEvent| {})
        .err()
        .expect("cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(*calls.lock().expect("lock"), 0);
}

fn failing_on(bad: usize) -> Arc<impl Fn(&Chunk) -> ShroudResult<usize> + Send + Sync + 'static> {
    Arc::new(move |chunk: &Chunk| -> ShroudResult<usize> {
        if chunk.meta.index == bad {
            return Err(CompileError::at(Opcode::Nop, 0, "boom").boxed());
        }
        Ok(chunk.meta.index)
    })
}

#[test]
fn a_failed_chunk_fails_the_job() {
    let script = statements_script(60);
    let chunks = chunks_of(&script, 150);
    let err = WorkerPool::new(1, FailurePolicy::FailJob)
        .run(chunks, failing_on(1), &CancellationToken::new(), |_: &PoolEvent| {})
        .err()
        .expect("job must fail");
    assert_eq!(err.kind(), ErrorKind::ChunkProcessing);
    assert!(err.message().starts_with("chunk 2/"), "{}", err.message());
    assert!(err.message().contains("boom"));
}

#[test]
fn report_gaps_keeps_every_other_chunk() {
    let script = statements_script(60);
    let chunks = chunks_of(&script, 150);
    let total = chunks.len();
    let outcomes = WorkerPool::new(2, FailurePolicy::ReportGaps)
        .run(chunks, failing_on(1), &CancellationToken::new(), |_: &PoolEvent| {})
        .expect("partial result");
    assert_eq!(outcomes.len(), total);
    for (meta, outcome) in &outcomes {
        assert_eq!(outcome.is_done(), meta.index != 1, "chunk {}", meta.index);
    }
}

#[test]
fn a_panicking_worker_is_reported() {
    let script = statements_script(30);
    let chunks = chunks_of(&script, 100);
    let processor = Arc::new(|chunk: &Chunk| -> ShroudResult<()> {
        if chunk.meta.index == 0 {
            panic!("worker blew up");
        }
        Ok(())
    });
    let err = WorkerPool::new(2, FailurePolicy::FailJob)
        .run(chunks, processor, &CancellationToken::new(), |_: &PoolEvent| {})
        .err()
        .expect("panic must surface");
    assert_eq!(err.kind(), ErrorKind::ChunkProcessing);
}
