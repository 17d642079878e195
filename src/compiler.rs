//! The compiler/orchestrator: walks include and library-section references
//! across files, driving the scanner and chunk parser to build one
//! aggregated [`ParseResult`] for the whole translation unit.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::chunk::{self, ParseResult};
use crate::error::{EngineError, ParseError};
use crate::format::FormatStrategy;
use crate::library;
use crate::model::Child;
use crate::region::{IncludeDirective, LibraryDirective, ParseRegion, RegionType};
use crate::scanner::{self};

/// Everything discovered while compiling a whole translation unit: cells and
/// errors from every visited region, plus the raw library content blobs
/// registered for the linker's lazy model resolver.
#[derive(Default)]
pub struct Aggregate {
    pub cells: Vec<Child>,
    pub errors: Vec<ParseError>,
    pub library_contents: Vec<(PathBuf, String)>,
    /// Unresolved strict include/library-section directives, logged as
    /// warnings rather than propagated as fatal errors (SPEC_FULL.md §7).
    pub warnings: Vec<String>,
}

/// Compiles the translation unit rooted at `root`, returning the aggregated
/// result of every region reachable by include/library traversal.
///
/// `num_workers`, when set, bounds the size of the rayon thread pool used to
/// parse each round's regions in parallel; `None` uses rayon's global pool.
#[instrument(skip(root, format), fields(root = %root.display()))]
pub fn compile(
    root: &Path,
    format: &dyn FormatStrategy,
    num_workers: Option<usize>,
) -> Result<Aggregate, EngineError> {
    let root = root
        .canonicalize()
        .map_err(|source| EngineError::RootFileOpen {
            path: root.to_path_buf(),
            source,
        })?;

    // The root file must exist and be readable; every later include failure
    // degrades to a warning instead.
    scanner::open_mmap(&root)?;

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<ParseRegion> = VecDeque::new();
    let mut aggregate = Aggregate::default();

    let seed = ParseRegion::whole_file(root.clone());
    visited.insert(seed.key());
    queue.push_back(seed);

    match num_workers {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .expect("failed to build worker pool");
            pool.install(|| drain_queue(&root, format, &mut queue, &mut visited, &mut aggregate));
        }
        None => drain_queue(&root, format, &mut queue, &mut visited, &mut aggregate),
    }

    Ok(aggregate)
}

/// Processes the work queue level-by-level: each round's regions are parsed
/// in parallel, then the directives they produced seed the next round.
fn drain_queue(
    root: &Path,
    format: &dyn FormatStrategy,
    queue: &mut VecDeque<ParseRegion>,
    visited: &mut HashSet<String>,
    aggregate: &mut Aggregate,
) {
    while !queue.is_empty() {
        let batch: Vec<ParseRegion> = queue.drain(..).collect();

        // Whole-file regions are scanned (sequentially, on this thread) into
        // their constituent Global/Macro sub-regions; byte-range regions
        // (library sections) are already leaves.
        let mut leaves: Vec<ParseRegion> = Vec::new();
        for region in batch {
            if region.is_whole_file() {
                match scanner::scan(&region.filepath, format) {
                    Ok(sub_regions) => leaves.extend(sub_regions),
                    Err(err) => warn!("failed to scan {}: {err}", region.filepath.display()),
                }
            } else {
                leaves.push(region);
            }
        }

        let results: Vec<ParseResult> = leaves
            .par_iter()
            .map(|region| parse_leaf(region, format))
            .collect();

        let mut next_directives: Vec<IncludeDirective> = Vec::new();
        let mut next_library_directives: Vec<LibraryDirective> = Vec::new();

        for result in results {
            for err in &result.errors {
                debug!("{}: {err}", result.filepath.display());
            }
            aggregate.cells.extend(result.cells);
            aggregate.errors.extend(result.errors);
            next_directives.extend(result.includes);
            next_library_directives.extend(result.libraries);
        }

        for inc in next_directives {
            handle_include(root, inc, queue, visited, aggregate);
        }
        for lib in next_library_directives {
            handle_library(root, lib, queue, visited, aggregate);
        }
    }
}

fn parse_leaf(region: &ParseRegion, format: &dyn FormatStrategy) -> ParseResult {
    match scanner::open_mmap(&region.filepath) {
        Ok(mmap) => chunk::parse_region(region, &mmap, format),
        Err(err) => {
            let mut result = ParseResult {
                filepath: region.filepath.clone(),
                ..Default::default()
            };
            result.errors.push(ParseError::new(
                0,
                format!("failed to open {}: {err}", region.filepath.display()),
                None,
            ));
            result
        }
    }
}

fn handle_include(
    root: &Path,
    directive: IncludeDirective,
    queue: &mut VecDeque<ParseRegion>,
    visited: &mut HashSet<String>,
    aggregate: &mut Aggregate,
) {
    match resolve_path(root, &directive.source_file, &directive.filepath) {
        Some(path) => enqueue(ParseRegion::whole_file(path), queue, visited),
        None => {
            if directive.strict {
                let msg = format!(
                    "could not resolve include '{}' referenced from {}",
                    directive.filepath,
                    directive.source_file.display()
                );
                warn!("{msg}");
                aggregate.warnings.push(msg);
            }
        }
    }
}

fn handle_library(
    root: &Path,
    directive: LibraryDirective,
    queue: &mut VecDeque<ParseRegion>,
    visited: &mut HashSet<String>,
    aggregate: &mut Aggregate,
) {
    let Some(path) = resolve_path(root, &directive.source_file, &directive.filepath) else {
        if directive.strict {
            let msg = format!(
                "could not resolve library '{}' referenced from {}",
                directive.filepath,
                directive.source_file.display()
            );
            warn!("{msg}");
            aggregate.warnings.push(msg);
        }
        return;
    };

    let Some(section) = &directive.section else {
        enqueue(ParseRegion::whole_file(path), queue, visited);
        return;
    };

    let mmap = match scanner::open_mmap(&path) {
        Ok(mmap) => mmap,
        Err(err) => {
            warn!("failed to open library {}: {err}", path.display());
            return;
        }
    };
    let content = String::from_utf8_lossy(&mmap).into_owned();

    match library::find_section(&content, section) {
        Some((start, end)) => {
            aggregate
                .library_contents
                .push((path.clone(), content[start..end].to_string()));
            enqueue(
                ParseRegion {
                    filepath: path,
                    start_byte: start,
                    end_byte: end as i64,
                    region_type: RegionType::Global,
                    context_delimiter: None,
                    context_name: None,
                },
                queue,
                visited,
            );
        }
        None => {
            let msg = format!(
                "library section '{}' not found in {}",
                section,
                path.display()
            );
            warn!("{msg}");
            aggregate.warnings.push(msg);
        }
    }
}

fn enqueue(region: ParseRegion, queue: &mut VecDeque<ParseRegion>, visited: &mut HashSet<String>) {
    if visited.insert(region.key()) {
        queue.push_back(region);
    }
}

/// Path resolution order (SPEC_FULL.md §6): absolute-and-exists, relative to
/// the referring file's directory, relative to the root file's directory.
fn resolve_path(root: &Path, referring_file: &Path, filename: &str) -> Option<PathBuf> {
    let candidate = Path::new(filename);
    if candidate.is_absolute() && candidate.exists() {
        return Some(candidate.to_path_buf());
    }
    if let Some(dir) = referring_file.parent() {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    if let Some(dir) = root.parent() {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
