//! Error types for the ingestion pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// A parse error discovered while folding/dispatching a logical line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// 1-indexed line number within the region's source file.
    pub line_number: usize,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// The offending line content, if available.
    pub line_content: Option<String>,
}

impl ParseError {
    pub fn new(line_number: usize, message: impl Into<String>, line_content: Option<String>) -> Self {
        Self {
            line_number,
            message: message.into(),
            line_content,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line_number, self.message)
    }
}

/// The kind of structural problem discovered while linking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkErrorKind {
    /// An instance referenced a model name that could not be resolved.
    UndefinedModel,
    /// A macro or model declaration had no usable name.
    UnnamedCell,
    /// The same macro name was declared more than once.
    DuplicateDefinition,
    /// The macro dependency graph contains a cycle.
    CircularDependency,
}

/// A non-fatal structural error produced by the linker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkError {
    pub kind: LinkErrorKind,
    pub message: String,
    pub affected_cells: Vec<String>,
}

impl LinkError {
    pub fn new(kind: LinkErrorKind, message: impl Into<String>, affected_cells: Vec<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            affected_cells,
        }
    }
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {} ({:?})", self.kind, self.message, self.affected_cells)
    }
}

/// Fatal error produced by the engine. Recoverable structural problems do not
/// appear here; they accumulate in [`ParseError`]/[`LinkError`] lists instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open root file {path}: {source}")]
    RootFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory-map {path}: {source}")]
    Mmap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error writing netlist: {0}")]
    Write(#[from] std::io::Error),

    /// Only produced when [`crate::EngineConfig::strict_includes`] is set:
    /// promotes the first unresolved strict include/library directive from
    /// a warning (the default policy) to a fatal error.
    #[error("unresolved strict include/library directive: {0}")]
    StrictIncludeUnresolved(String),
}
