//! Bootstrap fragments of the generated program that vary with the target
//! dialect and the guard settings.

use super::{AntiDebug, Dialect, EnvironmentMode};

/// Globals a sandboxed program may still read.
pub const SANDBOX_GLOBALS: &[&str] = &[
    "assert", "error", "ipairs", "math", "next", "pairs", "pcall", "print", "rawequal", "select",
    "string", "table", "tonumber", "tostring", "type", "unpack",
];

/// Top-level local a chunked output keeps its one environment table in.
pub const SHARED_ENVIRONMENT: &str = "__shroud_env";

fn capture(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Lua51 => "getfenv and getfenv(1) or _G",
        Dialect::Lua53 => "_ENV",
        Dialect::Luau => "getfenv and getfenv() or _G",
    }
}

pub fn environment(dialect: Dialect, mode: EnvironmentMode) -> String {
    match mode {
        EnvironmentMode::Passthrough => format!("local $ENV = {}\n", capture(dialect)),
        EnvironmentMode::Isolated => {
            format!("local $ENV = setmetatable({{}}, {{__index = {}}})\n", capture(dialect))
        }
        EnvironmentMode::Sandbox => {
            let names = SANDBOX_GLOBALS.iter().map(|n| format!("\"{}\"", n)).collect::<Vec<_>>().join(", ");
            format!(
                "local $ENV = {{}}\ndo\n  local $src = {}\n  for $ii, $name in ipairs({{{}}}) do $ENV[$name] = $src[$name] end\nend\n",
                capture(dialect),
                names
            )
        }
    }
}

pub fn unpack(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Lua51 => "unpack",
        Dialect::Lua53 => "table.unpack",
        Dialect::Luau => "table.unpack or unpack",
    }
}

/// Byte-wise XOR helper `$BX`. Lua 5.1 has no bit library, so it does the
/// XOR with arithmetic on non-negative numbers.
pub fn xor_helper(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Lua51 => {
            "\
local function $BX($p, $q)
  local $r, $w = 0, 1
  while $p > 0 or $q > 0 do
    local $pb, $qb = $p % 2, $q % 2
    if $pb ~= $qb then $r = $r + $w end
    $p, $q, $w = ($p - $pb) / 2, ($q - $qb) / 2, $w * 2
  end
  return $r
end
"
        }
        Dialect::Lua53 => "local function $BX($p, $q) return $p ~ $q end\n",
        Dialect::Luau => "local $BX = bit32.bxor\n",
    }
}

/// Integer constant decode for an entry `$c = {1, e, k1, k2, k3}`.
pub fn integer_decode(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Lua53 => "$K[$i] = (($c[2] ~ $c[5]) // $c[4]) - $c[3]",
        // k3 is below 2^24, so only the low 24 bits need the XOR.
        Dialect::Lua51 | Dialect::Luau => {
            "local $lo = $c[2] % 16777216\n    $K[$i] = ($c[2] - $lo + $BX($lo, $c[5])) / $c[4] - $c[3]"
        }
    }
}

fn debugger_present(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Lua51 | Dialect::Lua53 => "(debug and debug.gethook and debug.gethook() ~= nil)",
        Dialect::Luau => {
            "(type(debug) ~= \"table\" or type(debug.info) ~= \"function\" or type(debug.traceback) ~= \"function\")"
        }
    }
}

fn reaction(mode: AntiDebug) -> &'static str {
    match mode {
        AntiDebug::Degrade => "$N = 0",
        AntiDebug::Abort | AntiDebug::Off => "$error(\"integrity violation\", 0)",
    }
}

/// Check run once before the bytecode is decrypted.
pub fn debugger_check(dialect: Dialect, mode: AntiDebug) -> String {
    format!("if {} then {} end\n", debugger_present(dialect), reaction(mode))
}

/// Check repeated from the dispatch loop every 4096 instructions.
pub fn debugger_tick(dialect: Dialect, mode: AntiDebug) -> String {
    format!(
        "  $tick = $tick + 1\n  if $tick % 4096 == 0 and {} then {} end\n",
        debugger_present(dialect),
        reaction(mode)
    )
}

pub fn stack(hardened: bool) -> &'static str {
    if hardened {
        "\
local $S0, $S1 = {}, {}
local function $push($v)
  $top = $top + 1
  if $top % 2 == 0 then $S0[$top] = $v else $S1[$top] = $v end
end
local function $pop()
  local $v
  if $top % 2 == 0 then
    $v = $S0[$top]
    $S0[$top] = nil
  else
    $v = $S1[$top]
    $S1[$top] = nil
  end
  $top = $top - 1
  return $v
end
"
    } else {
        "\
local $S = {}
local function $push($v)
  $top = $top + 1
  $S[$top] = $v
end
local function $pop()
  local $v = $S[$top]
  $S[$top] = nil
  $top = $top - 1
  return $v
end
"
    }
}
