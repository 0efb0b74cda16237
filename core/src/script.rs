use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use crate::error::{ErrorKind, Level, ShroudErrorExt, ShroudResult};

/// A Lua source file (or an in-memory snippet) to obfuscate.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    /// Byte offset of every line start, built on first use.
    line_starts: OnceLock<Vec<usize>>,
}

impl Script {
    pub fn new(path: PathBuf) -> ShroudResult<Self> {
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let content = std::fs::read_to_string(&path).map_err(|e| -> Box<dyn ShroudErrorExt> {
            Box::new(MissingScriptError { path: path.clone(), reason: e.to_string() })
        })?;
        Ok(Script { name, path, content, line_starts: OnceLock::new() })
    }

    /// Wrap source text that did not come from disk (tests, chunks, stdin).
    pub fn from_source(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Script { path: PathBuf::from(&name), name, content: content.into(), line_starts: OnceLock::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn display_content(&self) -> &str {
        &self.content
    }

    /// 1-based line and column (in chars) of byte `offset`. Lines are found
    /// by binary search over an index built once per script.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let starts = self.line_starts.get_or_init(|| {
            std::iter::once(0)
                .chain(self.content.match_indices('\n').map(|(i, _)| i + 1))
                .collect()
        });
        let offset = offset.min(self.content.len());
        let line = starts.partition_point(|start| *start <= offset).max(1);
        let start = starts[line - 1];
        let column = self.content.get(start..offset).map_or(offset - start, |text| text.chars().count()) + 1;
        (line, column)
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Script: {} at {:?}", self.name, self.path)
    }
}

/// Expand every pattern (plain paths or globs, relative to `workdir`) into
/// loaded scripts. Matches come back sorted by path; a pattern that matches
/// nothing is an error.
pub fn collect<S: AsRef<str>>(patterns: &[S], workdir: &Path) -> ShroudResult<Vec<Script>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            workdir.join(pattern).to_string_lossy().to_string()
        };
        let entries = glob::glob(&full).map_err(|e| -> Box<dyn ShroudErrorExt> {
            Box::new(MissingScriptError { path: PathBuf::from(pattern), reason: e.to_string() })
        })?;
        let mut matched: Vec<PathBuf> = entries.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        if matched.is_empty() {
            return Err(Box::new(MissingScriptError {
                path: PathBuf::from(pattern),
                reason: "no file matches this pattern".into(),
            }));
        }
        matched.sort();
        paths.extend(matched);
    }
    paths.dedup();
    log::debug!("collected {} script(s)", paths.len());
    paths.into_iter().map(Script::new).collect()
}

#[derive(Debug, Clone)]
pub struct MissingScriptError {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for MissingScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing script at {:?}: {}", self.path, self.reason)
    }
}

impl std::error::Error for MissingScriptError {}

impl ShroudErrorExt for MissingScriptError {
    fn level(&self) -> Level {
        Level::Error
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }

    fn message(&self) -> String {
        format!("Missing script at {:?}: {}", self.path, self.reason)
    }

    fn issuer(&self) -> String {
        "shroud.script".to_string()
    }

    fn span(&self) -> Option<crate::location::Span> {
        None
    }

    fn location(&self) -> Option<crate::location::Location> {
        None
    }
}
