use shroud_core::{
    bytecode::{Build, MAX_OPERAND, Opcode, disasm, write_operand},
    error::ErrorKind,
    options::ObfuscationOptions,
    passes::GarbageInjector,
    rng::ShroudRng,
    pipeline::build_unit,
    script::Script,
    vm::{Value, Vm},
};

const PROGRAM: &str = r#"
local a, b = 10, 32
local c = a + b
print(c)
x = 1
while x < 5 do
  x = x * 2
end
print(x)
if c > 40 and x == 8 then
  print("big")
else
  print("small")
end
print("a" .. "b" .. 1)
print(7 % 3, -7 % 3, 7 / 2)
print(2 ^ 10, not nil, #"hello")
print(type(nil), tostring(1.5), tonumber("0x10"))
local d = nil or "fallback"
print(d, false and 1, 1 and 2)
"#;

const EXPECTED: &str = "42\n8\nbig\nab1\n1\t2\t3.5\n1024.0\ttrue\t5\nnil\t1.5\t16\nfallback\tfalse\t2\n";

fn build(src: &str, options: &ObfuscationOptions, seed: u64) -> Build {
    let script = Script::from_source("program.lua", src);
    build_unit(&script, options, seed).expect("build")
}

fn run(build: &Build) -> (String, Vec<Value>) {
    let mut vm = Vm::new().with_step_limit(1_000_000);
    let values = vm.run(build).expect("vm run");
    (vm.take_output(), values)
}

fn configurations() -> Vec<(&'static str, ObfuscationOptions)> {
    let mut flattened = ObfuscationOptions::minimal();
    flattened.flatten_control_flow = true;
    let mut garbage_only = ObfuscationOptions::minimal();
    garbage_only.garbage_density = 1.0;
    vec![
        ("minimal", ObfuscationOptions::minimal()),
        ("default", ObfuscationOptions::default()),
        ("maximum", ObfuscationOptions::maximum()),
        ("flattened", flattened),
        ("garbage", garbage_only),
    ]
}

#[test]
fn program_behaves_the_same_under_every_configuration() {
    for (name, options) in configurations() {
        for seed in [1, 2, 3, 0xDEAD_BEEF] {
            let build = build(PROGRAM, &options, seed);
            let (output, _) = run(&build);
            assert_eq!(output, EXPECTED, "configuration {} seed {}", name, seed);
        }
    }
}

#[test]
fn return_values_and_multiple_results() {
    let src = "local a, b, c = tostring(1)\nprint(a, b, c)\nreturn a, type(b), print('x')";
    let (output, values) = run(&build(src, &ObfuscationOptions::default(), 4));
    assert_eq!(output, "1\tnil\tnil\nx\n");
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].to_string(), "1");
    assert_eq!(values[1].to_string(), "nil");
}

#[test]
fn parenthesised_call_truncates_to_one_value() {
    let src = "print((tostring(5)), tostring(6))";
    let (output, _) = run(&build(src, &ObfuscationOptions::minimal(), 1));
    assert_eq!(output, "5\t6\n");
}

#[test]
fn globals_persist_between_runs() {
    let options = ObfuscationOptions::minimal();
    let mut vm = Vm::new();
    vm.run(&build("counter = 41", &options, 1)).expect("first");
    vm.run(&build("counter = counter + 1", &options, 2)).expect("second");
    assert_eq!(vm.global("counter").map(Value::to_string), Some("42".to_string()));
}

#[test]
fn every_jump_lands_on_an_instruction() {
    for (name, options) in configurations() {
        for seed in 0..8 {
            let build = build(PROGRAM, &options, seed);
            assert!(!build.jump_operands.is_empty(), "{}", name);
            for target in build.jump_targets() {
                assert!(target < build.code.len(), "{} seed {}: target {} out of range", name, seed, target);
                assert!(build.instruction_offsets.contains(&target), "{} seed {}: {} is mid-instruction", name, seed, target);
            }
        }
    }
}

#[test]
fn build_always_ends_with_return() {
    for src in ["", "print(1)", "x = 1 return x"] {
        let build = build(src, &ObfuscationOptions::maximum(), 9);
        let instructions = build.decode().expect("decode");
        let last = instructions.last().expect("at least one instruction");
        assert_eq!(last.opcode, Opcode::Return);
        assert_eq!(last.operands, vec![0, 0]);
    }
}

#[test]
fn empty_script_runs_and_prints_nothing() {
    let (output, values) = run(&build("", &ObfuscationOptions::default(), 1));
    assert!(output.is_empty());
    assert!(values.is_empty());
}

#[test]
fn garbage_does_not_change_behaviour() {
    let mut clean = ObfuscationOptions::default();
    clean.garbage_density = 0.0;
    let mut dirty = clean.clone();
    dirty.garbage_density = 1.0;

    for seed in 0..8 {
        let clean_build = build(PROGRAM, &clean, seed);
        let dirty_build = build(PROGRAM, &dirty, seed);
        assert_eq!(clean_build.stats.garbage_blocks, 0);
        assert_eq!(dirty_build.stats.garbage_blocks, clean_build.instruction_offsets.len());
        assert!(dirty_build.code.len() > clean_build.code.len());

        // The clean stream survives as a subsequence once garbage is skipped.
        let clean_ops: Vec<Opcode> = clean_build.decode().expect("decode").into_iter().map(|i| i.opcode).collect();
        let dirty_ops: Vec<Opcode> = dirty_build.decode().expect("decode").into_iter().map(|i| i.opcode).collect();
        let mut remaining = clean_ops.iter().peekable();
        for op in &dirty_ops {
            if remaining.peek() == Some(&op) {
                remaining.next();
            }
        }
        assert!(remaining.next().is_none(), "seed {}: clean stream is not a subsequence", seed);

        assert_eq!(run(&clean_build).0, run(&dirty_build).0, "seed {}", seed);
    }
}

#[test]
fn garbage_refuses_to_push_jumps_past_the_operand_range() {
    // One opaque span filling the whole operand range, then a jump to itself.
    let mut build = build("print(1)", &ObfuscationOptions::minimal(), 1);
    let last = MAX_OPERAND as usize;
    let mut code = vec![build.opcode_map.encode(Opcode::Nop); last];
    code.push(build.opcode_map.encode(Opcode::Jmp));
    write_operand(&mut code, MAX_OPERAND);
    build.code = code;
    build.instruction_offsets = vec![0, last];
    build.jump_operands = vec![last + 1];

    let err = GarbageInjector::new(1.0).inject(&mut build, &mut ShroudRng::new(2)).err().expect("must overflow");
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert!(err.message().contains("24-bit operand range"), "{}", err.message());
}

#[test]
fn flattening_keeps_locals_and_early_returns() {
    let src = "local n = 3\nlocal acc = ''\nwhile n > 0 do acc = acc .. n n = n - 1 end\nprint(acc)\nreturn acc";
    let mut options = ObfuscationOptions::minimal();
    let (plain_out, plain_ret) = run(&build(src, &options, 5));
    options.flatten_control_flow = true;
    let (flat_out, flat_ret) = run(&build(src, &options, 5));
    assert_eq!(plain_out, "321\n");
    assert_eq!(flat_out, plain_out);
    assert_eq!(flat_ret.len(), 1);
    assert_eq!(flat_ret[0].to_string(), plain_ret[0].to_string());
}

#[test]
fn same_seed_reproduces_the_build() {
    let options = ObfuscationOptions::maximum();
    let a = build(PROGRAM, &options, 77);
    let b = build(PROGRAM, &options, 77);
    assert_eq!(a.code, b.code);
    assert_eq!(a.constants, b.constants);
    assert_eq!(a.opcode_map, b.opcode_map);
    assert_ne!(build(PROGRAM, &options, 78).code, a.code);
}

#[test]
fn runtime_errors_report_position() {
    let err = Vm::new().run(&build("x = nil + 1", &ObfuscationOptions::minimal(), 1)).err().expect("error");
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(err.message().contains("arithmetic on a nil value"), "{}", err.message());

    let err = Vm::new().run(&build("undefined_function()", &ObfuscationOptions::minimal(), 1)).err().expect("error");
    assert!(err.message().contains("attempt to call a nil value"), "{}", err.message());
}

#[test]
fn step_limit_stops_runaway_loops() {
    let build = build("while true do x = 1 end", &ObfuscationOptions::minimal(), 1);
    let err = Vm::new().with_step_limit(10_000).run(&build).err().expect("step limit");
    assert!(err.message().contains("step limit"));
}

#[test]
fn float_formatting_follows_lua() {
    let src = "print(1.0, 0.1, 1e100, 10 / 3, -0.5, 100000000000000.0, 3 * 1.5)";
    let (output, _) = run(&build(src, &ObfuscationOptions::minimal(), 1));
    assert_eq!(output, "1.0\t0.1\t1e+100\t3.3333333333333\t-0.5\t1e+14\t4.5\n");
}

#[test]
fn listing_names_jump_targets() {
    let build = build("local i = 0\nwhile i < 2 do i = i + 1 end\nprint('done')", &ObfuscationOptions::minimal(), 1);
    let lines = disasm::listing(&build).expect("listing");
    assert_eq!(lines.len(), build.instruction_offsets.len());
    assert!(lines.iter().any(|l| l.label.as_deref() == Some("L0")));
    let jumps: Vec<_> = lines.iter().filter(|l| l.mnemonic.starts_with("JMP")).collect();
    assert!(!jumps.is_empty());
    assert!(jumps.iter().all(|l| l.operands.starts_with('L')));
    assert!(lines.iter().any(|l| l.comment.as_deref() == Some("\"done\"")));

    let text = disasm::disassemble(&build).expect("disassemble");
    assert!(text.starts_with(&format!("; {} bytes", build.code.len())));
    assert!(text.contains("L0:\n"));
    assert!(text.contains("RETURN"));
}
