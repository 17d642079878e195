//! Format-agnostic region scanner.
//!
//! Walks a memory-mapped file line by line and splits it into an ordered,
//! non-overlapping sequence of [`ParseRegion`]s tagged [`RegionType::Global`]
//! or [`RegionType::Macro`], driven by a [`ScanStrategy`] that recognizes
//! macro-start/macro-end lines for a particular dialect.

use std::collections::VecDeque;
use std::path::Path;

use arcstr::ArcStr;
use memmap2::Mmap;
use tracing::instrument;

use crate::error::EngineError;
use crate::region::{ParseRegion, RegionType};

/// Recognizes macro boundaries for one netlist dialect. The scanner itself
/// has no notion of `.subckt`/`.ends`; that knowledge lives here.
pub trait ScanStrategy: Send + Sync {
    /// If `line` opens a macro scope, returns the delimiter token used and
    /// the macro's name.
    fn matches_macro_start(&self, line: &str) -> Option<(ArcStr, ArcStr)>;
    /// Whether `line` closes one level of macro nesting.
    fn matches_macro_end(&self, line: &str) -> bool;
}

/// Opens a read-only memory mapping on `path`.
pub fn open_mmap(path: &Path) -> Result<Mmap, EngineError> {
    let file = std::fs::File::open(path).map_err(|source| EngineError::RootFileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    // SAFETY: the mapping is read-only and scoped to this call; callers do
    // not mutate the backing file while the mapping is alive.
    unsafe { Mmap::map(&file) }.map_err(|source| EngineError::Mmap {
        path: path.to_path_buf(),
        source,
    })
}

struct ScanState {
    depth: i32,
    current_start: usize,
    context_delimiter: Option<ArcStr>,
    context_name: Option<ArcStr>,
    in_macro: bool,
}

impl ScanState {
    fn new() -> Self {
        Self {
            depth: 0,
            current_start: 0,
            context_delimiter: None,
            context_name: None,
            in_macro: false,
        }
    }
}

/// Scans `filepath`'s full contents into an ordered list of regions.
#[instrument(skip(filepath, strategy), fields(path = %filepath.display()))]
pub fn scan(
    filepath: &Path,
    strategy: &dyn ScanStrategy,
) -> Result<VecDeque<ParseRegion>, EngineError> {
    let mmap = open_mmap(filepath)?;
    Ok(scan_bytes(filepath, &mmap, strategy))
}

fn scan_bytes(filepath: &Path, bytes: &[u8], strategy: &dyn ScanStrategy) -> VecDeque<ParseRegion> {
    let mut regions = VecDeque::new();
    let mut state = ScanState::new();

    let mut offset = 0usize;
    let len = bytes.len();
    while offset < len {
        let line_start = offset;
        let nl = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p);
        let (line_end_excl_nl, next_offset) = match nl {
            Some(nl_pos) => (nl_pos, nl_pos + 1),
            None => (len, len),
        };
        let raw_line = &bytes[line_start..line_end_excl_nl];
        let line = String::from_utf8_lossy(raw_line);
        let line = line.trim_end_matches('\r');

        handle_line(
            filepath,
            &mut state,
            &mut regions,
            strategy,
            line,
            line_start,
            next_offset,
        );

        offset = next_offset;
    }

    finalize(filepath, &mut state, &mut regions, len);
    regions
}

fn handle_line(
    filepath: &Path,
    state: &mut ScanState,
    regions: &mut VecDeque<ParseRegion>,
    strategy: &dyn ScanStrategy,
    line: &str,
    line_start: usize,
    line_end: usize,
) {
    if !state.in_macro {
        if let Some((delimiter, name)) = strategy.matches_macro_start(line) {
            if line_start > state.current_start {
                regions.push_back(flush_global(filepath, state.current_start, line_start));
            }
            state.context_delimiter = Some(delimiter);
            state.context_name = Some(name);
            state.current_start = line_start;
            state.depth = 1;
            state.in_macro = true;
        }
        return;
    }

    if strategy.matches_macro_start(line).is_some() {
        state.depth += 1;
    } else if strategy.matches_macro_end(line) {
        state.depth -= 1;
        if state.depth <= 0 {
            regions.push_back(ParseRegion {
                filepath: filepath.to_path_buf(),
                start_byte: state.current_start,
                end_byte: line_end as i64,
                region_type: RegionType::Macro,
                context_delimiter: state.context_delimiter.take(),
                context_name: state.context_name.take(),
            });
            state.current_start = line_end;
            state.in_macro = false;
        }
    }
}

fn flush_global(filepath: &Path, start: usize, end: usize) -> ParseRegion {
    ParseRegion {
        filepath: filepath.to_path_buf(),
        start_byte: start,
        end_byte: end as i64,
        region_type: RegionType::Global,
        context_delimiter: None,
        context_name: None,
    }
}

fn finalize(filepath: &Path, state: &mut ScanState, regions: &mut VecDeque<ParseRegion>, len: usize) {
    if state.current_start < len {
        // An unterminated macro (missing `.ends`) degrades to a trailing
        // global region rather than being silently dropped.
        regions.push_back(flush_global(filepath, state.current_start, len));
    }
}
