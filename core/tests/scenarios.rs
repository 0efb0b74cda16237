//! End-to-end jobs, from source text to what the generated program does.

use shroud_core::{
    chunk::CancellationToken,
    options::ObfuscationOptions,
    pipeline::{build_unit, chunked_header, obfuscate, obfuscate_source},
    progress::NoProgress,
    script::Script,
    vm::Vm,
};

fn vm_output(src: &str, options: &ObfuscationOptions, seed: u64) -> String {
    let build = build_unit(&Script::from_source("scenario.lua", src), options, seed).expect("build");
    let mut vm = Vm::new().with_step_limit(1_000_000);
    vm.run(&build).expect("run");
    vm.take_output()
}

#[test]
fn hello_world_with_every_transform_off() {
    let mut options = ObfuscationOptions::minimal();
    options.seed = Some(1);
    assert_eq!(vm_output("print(\"hi\")", &options, 1), "hi\n");

    let output = obfuscate_source("hello.lua", "print(\"hi\")", &options).expect("obfuscate");
    assert!(output.starts_with("return (function(...)\n"));
    assert!(output.contains("\"hi\""));
    assert!(output.contains("\"print\""));
}

#[test]
fn encrypted_string_is_hidden_but_still_printed() {
    let src = "local s = \"secret\"\nprint(s)";
    let mut options = ObfuscationOptions::default();
    options.seed = Some(42);
    options.encrypt_strings = true;

    let output = obfuscate_source("secret.lua", src, &options).expect("obfuscate");
    assert!(!output.contains("secret"));
    assert_eq!(vm_output(src, &options, 42), "secret\n");
}

#[test]
fn five_megabyte_input_is_chunked() {
    let padding = "x".repeat(1000);
    let mut source = String::with_capacity(5 * 1024 * 1024 + 2048);
    let mut i = 0;
    while source.len() < 5 * 1024 * 1024 {
        source.push_str(&format!("print(\"{:06}{}\")\n", i, padding));
        i += 1;
    }
    let mut options = ObfuscationOptions::minimal();
    options.seed = Some(5);
    options.chunking.threshold_bytes = 100 * 1024;
    let script = Script::from_source("huge.lua", source);

    let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate");
    assert!(result.chunks.len() >= 50, "only {} chunks", result.chunks.len());
    assert!(result.gaps.is_empty());
    assert_eq!(result.metrics.chunk_count, result.chunks.len());

    let header = chunked_header(result.chunks.len(), script.len());
    assert!(header.starts_with("-- shroud:"));
    assert!(result.output.starts_with(&header));
    let assembled: usize = result.chunks.iter().map(|c| c.marker_bytes + c.fragment_bytes).sum();
    assert_eq!(result.output.len(), header.len() + assembled);

    let covered: usize = result.chunks.iter().map(|c| c.meta.range.len()).sum();
    assert_eq!(covered, script.len());
}

#[test]
fn polymorphic_builds_differ_but_behave_the_same() {
    let src = "local total = 0\nlocal i = 1\nwhile i <= 10 do total = total + i i = i + 1 end\nprint('sum', total)";
    let mut options = ObfuscationOptions::minimal();
    options.shuffle_opcodes = true;
    options.opcode_polymorphism = true;

    let script = Script::from_source("poly.lua", src);
    let first = build_unit(&script, &options, 1).expect("seed 1");
    let second = build_unit(&script, &options, 2).expect("seed 2");
    assert_ne!(first.opcode_map, second.opcode_map);

    let expected = vm_output(src, &ObfuscationOptions::minimal(), 1);
    assert_eq!(expected, "sum\t55\n");
    assert_eq!(vm_output(src, &options, 1), expected);
    assert_eq!(vm_output(src, &options, 2), expected);
}
