pub mod ast;
pub mod bytecode;
pub mod chunk;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod location;
pub mod metrics;
pub mod options;
pub mod passes;
pub mod pipeline;
pub mod progress;
pub mod rng;
pub mod script;
pub mod vm;

pub use ast::{AstNode, RulesParser};
pub use bytecode::{Build, Opcode};
pub use chunk::{CancellationToken, ChunkMetadata, FailurePolicy};
pub use codegen::{AntiDebug, Dialect, EnvironmentMode};
pub use error::{ErrorKind, Level, ShroudErrorExt, ShroudResult};
pub use ir::{IrNode, lower_ast_to_ir};
pub use location::{ByteRange, Location, Span};
pub use metrics::Metrics;
pub use options::{ChunkingOptions, ObfuscationOptions};
pub use pipeline::{ObfuscationResult, build_unit, obfuscate, obfuscate_source};
pub use progress::{Phase, Progress, ProgressSink};
pub use script::Script;
pub use vm::{Value, Vm};

pub fn generate_error_report(error: &dyn ShroudErrorExt) -> String {
    let level = error.level();
    let location = match error.location() {
        Some(loc) => loc.to_string(),
        None => "unknown location".to_string(),
    };
    let message = error.message();

    format!("SHROUD | {} | {} | {}", level, location, message)
}
