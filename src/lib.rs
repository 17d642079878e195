//! A high-throughput ingestion engine for hierarchical SPICE-family
//! netlists: scan, compile, parse and link a root file (plus everything it
//! transitively `.include`s or pulls in via `.lib` sections) into a fully
//! resolved [`Netlist`].

#![warn(missing_docs)]

pub mod chunk;
pub mod compiler;
pub mod error;
pub mod format;
pub mod graph;
pub mod library;
pub mod linker;
pub mod model;
pub mod netlist;
pub mod region;
pub mod registry;
pub mod scanner;


use std::path::Path;

use tracing::instrument;

use format::spice::SpiceFormat;

pub use error::{EngineError, LinkError, LinkErrorKind, ParseError};
pub use graph::{CircuitGraph, ConnectivityStats};
pub use model::{Child, Definition, Instance, Macro, Model, Netlist, Port, PrimitiveKind};

/// Engine-wide knobs that do not belong to any single stage.
///
/// This is the whole of the engine's configuration surface: there is no
/// config file or environment-variable layer here (that belongs to the
/// command-line entry point that isn't part of this crate), just the
/// parameters a library caller might reasonably want to set and a sane
/// default for each.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of worker threads used to parse regions in parallel. `None`
    /// uses rayon's global pool (bounded by available hardware
    /// parallelism).
    pub num_workers: Option<usize>,
    /// When `true`, an unresolved strict include/library directive is
    /// treated as a fatal [`EngineError`] instead of being recorded as a
    /// warning on the aggregate (SPEC_FULL.md §7 default policy).
    pub strict_includes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            strict_includes: false,
        }
    }
}

/// Runs the full pipeline — scan, compile, parse, link — over the
/// translation unit rooted at `root_filepath`, using the default
/// [`EngineConfig`].
pub fn read(root_filepath: impl AsRef<Path>) -> Result<Netlist, EngineError> {
    read_with_config(root_filepath, EngineConfig::default())
}

/// Runs the full pipeline with an explicit [`EngineConfig`].
#[instrument(skip(root_filepath, config), fields(root = %root_filepath.as_ref().display()))]
pub fn read_with_config(
    root_filepath: impl AsRef<Path>,
    config: EngineConfig,
) -> Result<Netlist, EngineError> {
    let root = root_filepath.as_ref();
    let format = SpiceFormat::new();

    let aggregate = compiler::compile(root, &format, config.num_workers)?;

    if config.strict_includes {
        if let Some(first) = aggregate.warnings.first() {
            return Err(EngineError::StrictIncludeUnresolved(first.clone()));
        }
    }

    let name = root
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "top".to_string());

    let netlist = linker::link(name, aggregate);
    Ok(netlist)
}
