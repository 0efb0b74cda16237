//! Reference VM.
//!
//! Runs a `Build` directly: opcodes go through the build's inverse map and
//! constants through the Rust decryptors. It backs `shroud run` and lets
//! tests check program behaviour without an external Lua runtime.

pub mod err;
mod exec;
mod host;
pub mod value;

use std::collections::HashMap;

pub use err::RuntimeError;
pub use value::{Builtin, Value};

use crate::{bytecode::Build, error::ShroudResult};

pub struct Vm {
    globals: HashMap<Vec<u8>, Value>,
    output: String,
    step_limit: Option<usize>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let globals = Builtin::ALL
            .iter()
            .map(|(name, builtin)| (name.as_bytes().to_vec(), Value::Builtin(*builtin)))
            .collect();
        Vm { globals, output: String::new(), step_limit: None }
    }

    /// Abort runs that execute more than `limit` instructions.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Execute `build` to completion and return what its `RETURN` produced.
    /// Globals persist across calls, so chunk builds can run in sequence.
    pub fn run(&mut self, build: &Build) -> ShroudResult<Vec<Value>> {
        exec::run_build(build, &mut self.globals, &mut self.output, self.step_limit)
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name.as_bytes())
    }

    /// Everything `print` wrote so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
