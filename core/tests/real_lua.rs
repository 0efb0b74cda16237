//! Generated programs executed by a real Lua 5.3 interpreter.

use mlua::Lua;
use shroud_core::{
    chunk::CancellationToken,
    codegen::{Dialect, EnvironmentMode},
    options::ObfuscationOptions,
    pipeline::obfuscate,
    progress::NoProgress,
    script::Script,
};

/// Replaces `print` with a collector, then loads the program text and runs
/// it. Returns what it printed and its return values joined by tabs.
const DRIVER: &str = r##"
local captured = {}
print = function(...)
  local parts = {}
  for i = 1, select("#", ...) do parts[i] = tostring((select(i, ...))) end
  captured[#captured + 1] = table.concat(parts, "\t") .. "\n"
end
local program = assert(load(generated, "=generated"))
local results = table.pack(program())
local values = {}
for i = 1, results.n do values[i] = tostring(results[i]) end
return table.concat(captured), table.concat(values, "\t")
"##;

fn execute(program: &str) -> (String, String) {
    let lua = Lua::new();
    lua.globals().set("generated", program).expect("program text");
    lua.load(DRIVER).set_name("driver").eval().unwrap_or_else(|e| panic!("lua error: {}\n{}", e, program))
}

fn lua53(mut options: ObfuscationOptions, seed: u64) -> ObfuscationOptions {
    options.dialect = Dialect::Lua53;
    options.seed = Some(seed);
    options
}

fn obfuscated(name: &str, src: &str, options: &ObfuscationOptions) -> String {
    let script = Script::from_source(name, src);
    obfuscate(&script, options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate").output
}

#[test]
fn hello_world_runs_with_every_transform_off() {
    let program = obfuscated("hello.lua", "print(\"hi\")", &lua53(ObfuscationOptions::minimal(), 1));
    assert_eq!(execute(&program), ("hi\n".to_string(), String::new()));
}

#[test]
fn encrypted_string_prints_in_clear() {
    let src = "local s = \"secret\"\nprint(s)";
    let mut options = lua53(ObfuscationOptions::default(), 42);
    options.encrypt_strings = true;
    let program = obfuscated("secret.lua", src, &options);
    assert!(!program.contains("secret"));
    assert_eq!(execute(&program).0, "secret\n");
}

#[test]
fn polymorphic_builds_agree_on_the_interpreter() {
    let src = "local total = 0\nlocal i = 1\nwhile i <= 10 do total = total + i i = i + 1 end\nprint('sum', total)";
    let mut options = lua53(ObfuscationOptions::minimal(), 1);
    options.shuffle_opcodes = true;
    options.opcode_polymorphism = true;
    let first = obfuscated("poly.lua", src, &options);
    options.seed = Some(2);
    let second = obfuscated("poly.lua", src, &options);
    assert_ne!(first, second);
    assert_eq!(execute(&first).0, "sum\t55\n");
    assert_eq!(execute(&second).0, "sum\t55\n");
}

#[test]
fn every_preset_keeps_behaviour_and_return_values() {
    let src = r#"
local a, b = 10, 32
local c = a + b
x = 1
while x < 5 do x = x * 2 end
if c > 40 and x == 8 then print("big", c) else print("small") end
print("a" .. "b" .. 1, 7 % 3, #"hello")
local flag = false
print(not flag, flag and 1, nil or "fallback")
return c, "done"
"#;
    let expected = ("big\t42\nab1\t1\t5\ntrue\tfalse\tfallback\n".to_string(), "42\tdone".to_string());
    for (name, preset) in [
        ("minimal", ObfuscationOptions::minimal()),
        ("default", ObfuscationOptions::default()),
        ("maximum", ObfuscationOptions::maximum()),
    ] {
        for seed in 0..3 {
            let program = obfuscated("preset.lua", src, &lua53(preset.clone(), seed));
            assert_eq!(execute(&program), expected, "{} seed {}", name, seed);
        }
    }
}

#[test]
fn chunked_output_runs_like_the_input() {
    let mut src = String::from("local total = 0\n");
    src.push_str(&(1..=30).map(|i| format!("total = total + {}\n", i)).collect::<String>());
    src.push_str("print(total)\nresult = total\n");
    src.push_str(&(0..40).map(|i| format!("print(\"line {}\")\n", i)).collect::<String>());
    src.push_str("if result > 400 then return result, 'early' end\n");
    src.push_str("print('unreachable')\n");
    let expected_output: String =
        std::iter::once("465\n".to_string()).chain((0..40).map(|i| format!("line {}\n", i))).collect();

    for environment in [EnvironmentMode::Passthrough, EnvironmentMode::Isolated, EnvironmentMode::Sandbox] {
        let mut options = lua53(ObfuscationOptions::default(), 9);
        options.environment = environment;
        options.chunking.threshold_bytes = 256;
        options.chunking.chunk_size = Some(128);
        options.chunking.workers = 2;

        let script = Script::from_source("chunked.lua", src.clone());
        let result = obfuscate(&script, &options, &mut NoProgress, &CancellationToken::new()).expect("obfuscate");
        assert!(result.chunks.len() > 2, "{}: {} chunks", environment, result.chunks.len());
        let (output, returned) = execute(&result.output);
        assert_eq!(output, expected_output, "{}", environment);
        assert_eq!(returned, "465\tearly", "{}", environment);
    }
}
