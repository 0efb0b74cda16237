use std::collections::BTreeSet;

use shroud_core::{
    bytecode::Opcode,
    codegen::{self, AntiDebug, CodegenOptions, Dialect, EnvironmentMode, Form, apply_key, integrity_hash, runtime},
    options::ObfuscationOptions,
    pipeline::build_unit,
    rng::ShroudRng,
    script::Script,
};

const SOURCE: &str = r#"
local greeting = "secret"
if #greeting > 3 then
  print(greeting .. "!")
end
"#;

fn options_for(dialect: Dialect) -> CodegenOptions {
    CodegenOptions { dialect, ..CodegenOptions::default() }
}

fn sample_build(options: &ObfuscationOptions, seed: u64) -> shroud_core::Build {
    build_unit(&Script::from_source("sample.lua", SOURCE), options, seed).expect("build")
}

#[test]
fn embedded_bytecode_decrypts_to_the_compiled_stream() {
    for seed in 0..16 {
        let build = sample_build(&ObfuscationOptions::maximum(), seed);
        let generated = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(seed))
            .expect("generate");
        assert!((8..=32).contains(&generated.key.len()));
        assert!(generated.key.iter().all(|k| *k != 0));
        assert_eq!(apply_key(&generated.encrypted, &generated.key), build.code);
        assert_ne!(generated.encrypted, build.code);
    }
}

#[test]
fn dispatch_table_has_one_handler_per_used_opcode() {
    for seed in 0..16 {
        let build = sample_build(&ObfuscationOptions::maximum(), seed);
        let generated = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(seed))
            .expect("generate");
        let used = build.used_opcodes().expect("used opcodes");
        let handled: BTreeSet<Opcode> = generated.handlers.iter().map(|(op, _)| *op).collect();
        assert_eq!(handled, used);
        assert_eq!(generated.handlers.len(), used.len());

        let codes: BTreeSet<u8> = generated.handlers.iter().map(|(_, code)| *code).collect();
        assert_eq!(codes.len(), generated.handlers.len());
        for (op, code) in &generated.handlers {
            assert_eq!(build.opcode_map.encode(*op), *code);
            let head = format!("[{}] = function()", code);
            assert_eq!(generated.source.matches(&head).count(), 1, "seed {}: {} ({})", seed, op, code);
        }
    }
}

#[test]
fn encrypted_strings_never_appear_in_output() {
    let mut options = ObfuscationOptions::default();
    options.encrypt_strings = true;
    let build = sample_build(&options, 3);
    let generated = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(3)).expect("generate");
    assert!(!generated.source.contains("secret"));
    assert!(build.stats.strings_encrypted >= 2);

    options.encrypt_strings = false;
    let build = sample_build(&options, 3);
    let generated = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(3)).expect("generate");
    assert!(generated.source.contains("\"secret\""));
}

#[test]
fn program_and_fragment_wrappers() {
    let build = sample_build(&ObfuscationOptions::default(), 1);
    let program = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(1)).expect("program");
    assert!(program.source.starts_with("return (function(...)\n"));
    assert!(program.source.ends_with("end)(...)\n"));

    let fragment_options = CodegenOptions { form: Form::Fragment, ..CodegenOptions::default() };
    let fragment = codegen::generate(&build, &fragment_options, &mut ShroudRng::new(1)).expect("fragment");
    assert!(fragment.source.starts_with("do (function(...)\n"));
    assert!(fragment.source.ends_with("end)(...) end\n"));
}

#[test]
fn dialects_choose_their_own_primitives() {
    let build = sample_build(&ObfuscationOptions::default(), 2);
    let lua51 = codegen::generate(&build, &options_for(Dialect::Lua51), &mut ShroudRng::new(2)).expect("5.1");
    let lua53 = codegen::generate(&build, &options_for(Dialect::Lua53), &mut ShroudRng::new(2)).expect("5.3");
    let luau = codegen::generate(&build, &options_for(Dialect::Luau), &mut ShroudRng::new(2)).expect("luau");

    assert!(lua51.source.contains("getfenv"));
    assert!(lua51.source.contains("= unpack\n"));
    assert!(lua53.source.contains("_ENV"));
    assert!(lua53.source.contains("table.unpack"));
    assert!(lua53.source.contains(" // "));
    assert!(luau.source.contains("bit32.bxor"));
}

#[test]
fn guards_are_emitted_when_enabled() {
    let build = sample_build(&ObfuscationOptions::default(), 5);
    let bare = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(5)).expect("bare");
    assert_eq!(bare.anti_debug_checks, 0);
    assert!(!bare.source.contains("integrity violation"));
    assert!(!bare.source.contains("gethook"));

    let guarded_options = CodegenOptions {
        integrity_check: true,
        anti_debug: AntiDebug::Abort,
        ..CodegenOptions::default()
    };
    let guarded = codegen::generate(&build, &guarded_options, &mut ShroudRng::new(5)).expect("guarded");
    assert_eq!(guarded.anti_debug_checks, 2);
    assert!(guarded.source.contains("integrity violation"));
    assert!(guarded.source.contains(&integrity_hash(&guarded.encrypted).to_string()));
    assert!(guarded.source.contains("debug.gethook"));
    assert!(guarded.source.contains("% 4096 == 0"));
}

#[test]
fn environment_modes() {
    let build = sample_build(&ObfuscationOptions::default(), 6);
    let isolated_options = CodegenOptions { environment: EnvironmentMode::Isolated, ..CodegenOptions::default() };
    let isolated = codegen::generate(&build, &isolated_options, &mut ShroudRng::new(6)).expect("isolated");
    assert!(isolated.source.contains("setmetatable({}, {__index ="));

    let sandbox_options = CodegenOptions { environment: EnvironmentMode::Sandbox, ..CodegenOptions::default() };
    let sandbox = codegen::generate(&build, &sandbox_options, &mut ShroudRng::new(6)).expect("sandbox");
    assert!(sandbox.source.contains("\"tostring\""));
    assert!(!sandbox.source.contains("\"os\""));
}

#[test]
fn shared_environment_is_read_not_rebuilt() {
    let build = sample_build(&ObfuscationOptions::default(), 6);
    let options = CodegenOptions {
        environment: EnvironmentMode::Sandbox,
        form: Form::Fragment,
        shared_environment: true,
        ..CodegenOptions::default()
    };
    let fragment = codegen::generate(&build, &options, &mut ShroudRng::new(6)).expect("fragment");
    assert!(fragment.source.contains(&format!(" = {}\n", runtime::SHARED_ENVIRONMENT)));
    assert!(!fragment.source.contains("\"tostring\""));

    let prelude = codegen::shared_environment_prelude(Dialect::Lua53, EnvironmentMode::Sandbox, &mut ShroudRng::new(6));
    assert!(prelude.starts_with(&format!("local {}\ndo\n", runtime::SHARED_ENVIRONMENT)));
    assert!(prelude.contains("\"tostring\""));
    assert!(prelude.ends_with("end\n"));
}

#[test]
fn stack_hardening_uses_two_stacks() {
    let build = sample_build(&ObfuscationOptions::minimal(), 8);
    let plain = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(8)).expect("plain");
    let hardened_options = CodegenOptions { stack_hardening: true, ..CodegenOptions::default() };
    let hardened = codegen::generate(&build, &hardened_options, &mut ShroudRng::new(8)).expect("hardened");
    assert!(hardened.source.contains("% 2 == 0"));
    assert!(hardened.source.len() > plain.source.len());
}

#[test]
fn renamed_helpers_hide_readable_names() {
    let build = sample_build(&ObfuscationOptions::default(), 4);
    let generated = codegen::generate(&build, &CodegenOptions::default(), &mut ShroudRng::new(4)).expect("generate");
    assert!(generated.identifiers_renamed > 0);
    assert!(!generated.source.contains("shroud_vm_"));
    assert!(!generated.source.contains('$'));

    let readable = sample_build(&ObfuscationOptions::minimal(), 4);
    let generated = codegen::generate(&readable, &CodegenOptions::default(), &mut ShroudRng::new(4)).expect("generate");
    assert_eq!(generated.identifiers_renamed, 0);
    assert!(generated.source.contains("shroud_vm_"));
    assert!(!generated.source.contains('$'));
}

#[test]
fn dialect_names_parse() {
    assert_eq!("lua53".parse::<Dialect>().expect("dialect"), Dialect::Lua53);
    assert_eq!("sandbox".parse::<EnvironmentMode>().expect("mode"), EnvironmentMode::Sandbox);
    assert_eq!("degrade".parse::<AntiDebug>().expect("anti-debug"), AntiDebug::Degrade);
    assert!("lua54".parse::<Dialect>().is_err());
    assert_eq!(Dialect::Luau.to_string(), "luau");
}
