//! Parse regions and the directive types that cause new regions to be
//! enqueued by the compiler.

use std::path::PathBuf;

use arcstr::ArcStr;

/// Whether a region covers the file's top-level scope or a single macro body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionType {
    Global,
    Macro,
}

/// A byte range within a single file, tagged with the scope it represents.
///
/// `end_byte == -1` is a sentinel meaning "to end of file"; every other
/// range is the half-open interval `[start_byte, end_byte)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseRegion {
    pub filepath: PathBuf,
    pub start_byte: usize,
    pub end_byte: i64,
    pub region_type: RegionType,
    /// The macro-start delimiter text (e.g. `.subckt`), when `region_type`
    /// is [`RegionType::Macro`].
    pub context_delimiter: Option<ArcStr>,
    /// The macro name, when `region_type` is [`RegionType::Macro`].
    pub context_name: Option<ArcStr>,
}

impl ParseRegion {
    pub fn whole_file(filepath: PathBuf) -> Self {
        Self {
            filepath,
            start_byte: 0,
            end_byte: -1,
            region_type: RegionType::Global,
            context_delimiter: None,
            context_name: None,
        }
    }

    pub fn is_whole_file(&self) -> bool {
        self.start_byte == 0 && self.end_byte == -1
    }

    /// The dedup key used by the compiler's visited set.
    pub fn key(&self) -> String {
        format!(
            "{}:{}-{}",
            self.filepath.display(),
            self.start_byte,
            self.end_byte
        )
    }
}

/// An unconditional `.include`/Cadence-bracket reference to another file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeDirective {
    /// The path exactly as written in the source file.
    pub filepath: String,
    /// The file that contained this directive, used as the base for
    /// relative path resolution.
    pub source_file: PathBuf,
    /// Strict directives (`.include`, `.lib`, `[!...]`) fail loudly when
    /// unresolved; lenient ones (`[?...]`) are silently dropped.
    pub strict: bool,
}

/// A `.lib <path> <section>` reference to a named section of another file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryDirective {
    pub filepath: String,
    pub source_file: PathBuf,
    pub strict: bool,
    pub section: Option<String>,
}
