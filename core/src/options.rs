//! file: core/src/options.rs
//! description: user-facing obfuscation settings.
//!
//! Every field has a default, so a JSON file only needs the keys it wants
//! to change. `validate` runs before any work starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    bytecode::compiler::CompileSettings,
    chunk::{DEFAULT_THRESHOLD, DEFAULT_WORKERS, FailurePolicy},
    codegen::{AntiDebug, CodegenOptions, Dialect, EnvironmentMode, Form},
    error::{ConfigError, Level, ShroudResult},
    passes::constants::EncryptionFlags,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    /// Inputs strictly larger than this are split into chunks.
    pub threshold_bytes: usize,
    /// Target chunk size; the threshold when unset.
    pub chunk_size: Option<usize>,
    pub workers: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        ChunkingOptions {
            threshold_bytes: DEFAULT_THRESHOLD,
            chunk_size: None,
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ChunkingOptions {
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(self.threshold_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationOptions {
    /// Fixed seed for a reproducible build; fresh entropy when unset.
    pub seed: Option<u64>,
    pub dialect: Dialect,
    pub rename_identifiers: bool,
    pub encrypt_strings: bool,
    pub encrypt_numbers: bool,
    pub encrypt_booleans: bool,
    pub shuffle_opcodes: bool,
    pub opcode_polymorphism: bool,
    /// Probability of a garbage sequence before each instruction.
    pub garbage_density: f64,
    pub flatten_control_flow: bool,
    pub integrity_check: bool,
    pub anti_debug: AntiDebug,
    pub environment: EnvironmentMode,
    pub stack_hardening: bool,
    pub chunking: ChunkingOptions,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        ObfuscationOptions {
            seed: None,
            dialect: Dialect::Lua51,
            rename_identifiers: true,
            encrypt_strings: true,
            encrypt_numbers: true,
            encrypt_booleans: false,
            shuffle_opcodes: true,
            opcode_polymorphism: false,
            garbage_density: 0.1,
            flatten_control_flow: false,
            integrity_check: true,
            anti_debug: AntiDebug::Off,
            environment: EnvironmentMode::Passthrough,
            stack_hardening: false,
            chunking: ChunkingOptions::default(),
        }
    }
}

impl ObfuscationOptions {
    /// Every transform off: canonical opcodes, raw constants, readable names.
    pub fn minimal() -> Self {
        ObfuscationOptions {
            rename_identifiers: false,
            encrypt_strings: false,
            encrypt_numbers: false,
            encrypt_booleans: false,
            shuffle_opcodes: false,
            opcode_polymorphism: false,
            garbage_density: 0.0,
            flatten_control_flow: false,
            integrity_check: false,
            anti_debug: AntiDebug::Off,
            environment: EnvironmentMode::Passthrough,
            stack_hardening: false,
            ..Self::default()
        }
    }

    pub fn maximum() -> Self {
        ObfuscationOptions {
            rename_identifiers: true,
            encrypt_strings: true,
            encrypt_numbers: true,
            encrypt_booleans: true,
            shuffle_opcodes: true,
            opcode_polymorphism: true,
            garbage_density: 0.3,
            flatten_control_flow: true,
            integrity_check: true,
            anti_debug: AntiDebug::Abort,
            environment: EnvironmentMode::Isolated,
            stack_hardening: true,
            ..Self::default()
        }
    }

    pub fn preset(name: &str) -> ShroudResult<Self> {
        match name {
            "minimal" => Ok(Self::minimal()),
            "default" => Ok(Self::default()),
            "maximum" => Ok(Self::maximum()),
            other => Err(config_error(format!("unknown preset '{}'", other))),
        }
    }

    pub fn from_json_str(text: &str) -> ShroudResult<Self> {
        let options: ObfuscationOptions =
            serde_json::from_str(text).map_err(|e| config_error(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> ShroudResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> ShroudResult<()> {
        if !(0.0..=1.0).contains(&self.garbage_density) {
            return Err(config_error(format!(
                "garbage_density must be within [0, 1], got {}",
                self.garbage_density
            )));
        }
        if self.chunking.workers == 0 {
            return Err(config_error("chunking.workers must be at least 1".to_string()));
        }
        if self.chunking.threshold_bytes == 0 || self.chunking.chunk_size == Some(0) {
            return Err(config_error("chunk sizes must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn compile_settings(&self) -> CompileSettings {
        CompileSettings {
            encryption: EncryptionFlags {
                strings: self.encrypt_strings,
                numbers: self.encrypt_numbers,
                booleans: self.encrypt_booleans,
            },
            rename_identifiers: self.rename_identifiers,
            shuffle_opcodes: self.shuffle_opcodes,
            opcode_polymorphism: self.opcode_polymorphism,
        }
    }

    pub fn codegen_options(&self, form: Form) -> CodegenOptions {
        CodegenOptions {
            dialect: self.dialect,
            environment: self.environment,
            anti_debug: self.anti_debug,
            integrity_check: self.integrity_check,
            stack_hardening: self.stack_hardening,
            form,
            shared_environment: false,
        }
    }
}

fn config_error(message: String) -> Box<dyn crate::error::ShroudErrorExt> {
    ConfigError::with(Level::Error, message, "shroud.options".into(), None, None).boxed()
}
