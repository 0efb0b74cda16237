//! file: core/src/codegen/mod.rs
//! description: emits the self-contained Lua program for a finished build.
//!
//! Layout of the generated code, top to bottom:
//!
//! 1. environment bootstrap and captured library functions;
//! 2. the encrypted bytecode array `$B` and its repeating key `$KEY`;
//! 3. optional integrity guard over the still encrypted array;
//! 4. optional debugger check;
//! 5. in-place decryption of `$B`;
//! 6. the constant table `$K`, decoded in place;
//! 7. VM state, the dispatch table `$H` (one handler per used opcode) and
//!    the fetch-decode-execute loop.
//!
//! Constant table entries are tagged: `{0, v}` raw, `{1, e, k1, k2, k3}`
//! integer, `{2, chunks}` string, `{3, chunks}` numeric text and
//! `{4, masked, mask}` boolean. Each chunk is `{index, key, {bytes}}`.

pub mod handlers;
pub mod runtime;
pub mod template;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    bytecode::{Build, Opcode},
    error::{ConfigError, ShroudErrorExt, ShroudResult},
    passes::{
        IdentifierObfuscator,
        constants::{Constant, PoolEntry, StringChunk},
    },
    rng::ShroudRng,
};

use template::{Names, byte_list, lua_float, lua_integer, lua_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Lua51,
    Lua53,
    Luau,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    /// Globals resolve against the caller's environment.
    #[default]
    Passthrough,
    /// Writes land in a private table; reads fall back to the caller's globals.
    Isolated,
    /// Only a fixed allow-list of library globals is visible.
    Sandbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntiDebug {
    #[default]
    Off,
    Abort,
    Degrade,
}

macro_rules! named_enum {
    ($ty:ident, $what:literal, $($name:literal => $variant:ident),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = Box<dyn ShroudErrorExt>;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(ConfigError::with(
                        crate::error::Level::Error,
                        format!("unknown {} '{}'", $what, other),
                        "shroud.codegen".into(),
                        None,
                        None,
                    )
                    .boxed()),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($ty::$variant => $name,)+
                };
                write!(f, "{}", name)
            }
        }
    };
}

named_enum!(Dialect, "dialect", "lua51" => Lua51, "lua53" => Lua53, "luau" => Luau);
named_enum!(EnvironmentMode, "environment mode", "passthrough" => Passthrough, "isolated" => Isolated, "sandbox" => Sandbox);
named_enum!(AntiDebug, "anti-debug mode", "off" => Off, "abort" => Abort, "degrade" => Degrade);

/// Whether the output stands alone or is one piece of a chunked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// `return (function(...) ... end)(...)`
    Program,
    /// `do (function(...) ... end)(...) end`
    Fragment,
}

#[derive(Debug, Clone, Copy)]
pub struct CodegenOptions {
    pub dialect: Dialect,
    pub environment: EnvironmentMode,
    pub anti_debug: AntiDebug,
    pub integrity_check: bool,
    pub stack_hardening: bool,
    pub form: Form,
    /// Read globals through the table the chunked prelude sets up instead
    /// of building a private one.
    pub shared_environment: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            dialect: Dialect::default(),
            environment: EnvironmentMode::default(),
            anti_debug: AntiDebug::default(),
            integrity_check: false,
            stack_hardening: false,
            form: Form::Program,
            shared_environment: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generated {
    pub source: String,
    /// Bytecode as embedded, after the repeating-key XOR.
    pub encrypted: Vec<u8>,
    pub key: Vec<u8>,
    /// `(opcode, emitted byte)` for every handler in the dispatch table.
    pub handlers: Vec<(Opcode, u8)>,
    pub anti_debug_checks: usize,
    pub identifiers_renamed: usize,
}

/// XOR `code` against the repeating `key`. Its own inverse.
pub fn apply_key(code: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return code.to_vec();
    }
    code.iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k).collect()
}

/// Rolling hash the integrity guard recomputes: `h = (h * 31 + b) mod 2^32`
/// from 7.
pub fn integrity_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(*b as u32))
}

/// Top of a chunked output: builds the environment table once, for every
/// fragment generated with `shared_environment`.
pub fn shared_environment_prelude(dialect: Dialect, mode: EnvironmentMode, rng: &mut ShroudRng) -> String {
    let mut identifiers = IdentifierObfuscator::new(true);
    let mut names = Names::new(&mut identifiers, rng);
    let setup = names.expand(&runtime::environment(dialect, mode));
    let env = names.get("ENV");
    let mut out = format!("local {}\ndo\n", runtime::SHARED_ENVIRONMENT);
    for line in setup.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("  {} = {}\nend\n", runtime::SHARED_ENVIRONMENT, env));
    out
}

pub fn generate(build: &Build, options: &CodegenOptions, rng: &mut ShroudRng) -> ShroudResult<Generated> {
    let used = build.used_opcodes()?;

    let key_len = rng.range(8, 32) as usize;
    let key: Vec<u8> = (0..key_len).map(|_| rng.byte(1, u8::MAX)).collect();
    let encrypted = apply_key(&build.code, &key);

    let mut handlers: Vec<(Opcode, u8)> = used.iter().map(|op| (*op, build.opcode_map.encode(*op))).collect();
    rng.shuffle(&mut handlers);

    let mut identifiers = build.identifiers.clone();
    let mut names = Names::new(&mut identifiers, rng);
    let dialect = options.dialect;
    let mut out = String::new();
    let mut anti_debug_checks = 0;

    out.push_str(match options.form {
        Form::Program => "return (function(...)\n",
        Form::Fragment => "do (function(...)\n",
    });
    if options.shared_environment {
        out.push_str(&names.expand(&format!("local $ENV = {}\n", runtime::SHARED_ENVIRONMENT)));
    } else {
        out.push_str(&names.expand(&runtime::environment(dialect, options.environment)));
    }
    out.push_str(&names.expand(&format!(
        "local $select, $tonumber, $error, $char, $concat = select, tonumber, error, string.char, table.concat\nlocal $unpack = {}\n",
        runtime::unpack(dialect)
    )));
    out.push_str(&names.expand(&format!(
        "local $B = {{\n{}\n}}\nlocal $KEY = {{{}}}\nlocal $N = #$B\n",
        byte_list(&encrypted, 64),
        byte_list(&key, 64)
    )));

    if options.integrity_check {
        out.push_str(&names.expand(&format!(
            "local $h = 7\nfor $i = 1, $N do $h = ($h * 31 + $B[$i]) % 4294967296 end\nif $h ~= {} then $error(\"integrity violation\", 0) end\n",
            integrity_hash(&encrypted)
        )));
    }

    out.push_str(&names.expand(runtime::xor_helper(dialect)));

    if options.anti_debug != AntiDebug::Off {
        out.push_str(&names.expand(&runtime::debugger_check(dialect, options.anti_debug)));
        anti_debug_checks += 1;
    }

    out.push_str(&names.expand("for $i = 1, $N do $B[$i] = $BX($B[$i], $KEY[($i - 1) % #$KEY + 1]) end\n"));

    out.push_str(&names.expand(&constant_table(&build.constants)));
    out.push_str(&names.expand(&format!(
        "\
for $i = 1, #$K do
  local $c = $K[$i]
  local $tag = $c[1]
  if $tag == 0 then
    $K[$i] = $c[2]
  elseif $tag == 1 then
    {}
  elseif $tag == 4 then
    $K[$i] = $BX($c[2], $c[3]) % 2 == 1
  else
    local $parts = {{}}
    for $j = 1, #$c[2] do
      local $ch = $c[2][$j]
      local $bytes = {{}}
      for $m = 1, #$ch[3] do $bytes[$m] = $char($BX($ch[3][$m], $ch[2])) end
      $parts[$ch[1] + 1] = $concat($bytes)
    end
    local $s = $concat($parts)
    if $tag == 3 then $K[$i] = $tonumber($s) else $K[$i] = $s end
  end
end
",
        runtime::integer_decode(dialect)
    )));

    out.push_str(&names.expand("local $top, $MR, $pc, $RN, $tick = 0, 0, 1, 0, 0\nlocal $L, $R = {}, {}\nlocal $STUB = function() end\n"));
    out.push_str(&names.expand(runtime::stack(options.stack_hardening)));
    out.push_str(&names.expand(
        "\
local function $rd()
  local $v = $B[$pc] * 65536 + $B[$pc + 1] * 256 + $B[$pc + 2]
  $pc = $pc + 3
  return $v
end
local function $pack(...) return {n = $select(\"#\", ...), ...} end
local $H = {}
",
    ));

    for (op, code) in &handlers {
        let body = names.expand(handlers::template(*op));
        let head = names.expand(&format!("$H[{}] = function()", code));
        out.push_str(&head);
        out.push('\n');
        for line in body.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("end\n");
    }

    out.push_str(&names.expand("while $pc <= $N do\n  local $op = $B[$pc]\n  $pc = $pc + 1\n  $H[$op]()\n"));
    if options.anti_debug != AntiDebug::Off {
        out.push_str(&names.expand(&runtime::debugger_tick(dialect, options.anti_debug)));
        anti_debug_checks += 1;
    }
    out.push_str("end\n");
    out.push_str(&names.expand("return $unpack($R, 1, $RN)\n"));
    out.push_str(match options.form {
        Form::Program => "end)(...)\n",
        Form::Fragment => "end)(...) end\n",
    });

    drop(names);
    log::debug!(
        "generated {} bytes of {} ({} handlers, {} guard checks)",
        out.len(),
        dialect,
        handlers.len(),
        anti_debug_checks
    );
    Ok(Generated {
        source: out,
        encrypted,
        key,
        handlers,
        anti_debug_checks,
        identifiers_renamed: identifiers.renamed(),
    })
}

fn constant_table(constants: &[PoolEntry]) -> String {
    let entries: Vec<String> = constants.iter().map(constant_entry).collect();
    format!("local $K = {{\n{}\n}}\n", entries.join(",\n"))
}

fn constant_entry(entry: &PoolEntry) -> String {
    match entry {
        PoolEntry::Raw(value) => format!("{{0, {}}}", raw_constant(value)),
        PoolEntry::Integer { encrypted, k1, k2, k3 } => format!("{{1, {}, {}, {}, {}}}", encrypted, k1, k2, k3),
        PoolEntry::Text { chunks, numeric } => {
            format!("{{{}, {{{}}}}}", if *numeric { 3 } else { 2 }, chunk_list(chunks))
        }
        PoolEntry::Boolean { masked, mask } => format!("{{4, {}, {}}}", masked, mask),
    }
}

fn raw_constant(value: &Constant) -> String {
    match value {
        Constant::Integer(v) => lua_integer(*v),
        Constant::Float(v) => lua_float(*v),
        Constant::String(bytes) => lua_string(bytes),
        Constant::Boolean(b) => b.to_string(),
    }
}

fn chunk_list(chunks: &[StringChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("{{{}, {}, {{{}}}}}", c.index, c.key, byte_list(&c.bytes, usize::MAX)))
        .collect::<Vec<_>>()
        .join(", ")
}
