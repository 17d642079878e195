//! Format-specific line dispatch strategies.
//!
//! A [`FormatStrategy`] turns one logical line into a [`LineResult`]; the
//! chunk parser folds physical lines into logical ones and owns dispatch
//! order (declaration before include before instance), while the strategy
//! owns the dialect-specific grammar.

pub mod spice;

use crate::model::{Instance, Macro, Model};
use crate::region::{IncludeDirective, LibraryDirective};

/// The outcome of matching a single logical line against a format's grammar.
pub enum LineResult {
    Declaration(Declaration),
    Instance(Instance),
    Include(IncludeDirective),
    Library(LibraryDirective),
    /// The line matched nothing recognized; it is silently ignored.
    None,
}

/// Either a subcircuit header (opens a new [`Macro`] scope) or a bare model
/// binding.
pub enum Declaration {
    Subckt(Macro),
    Model(Model),
    /// A `.ends` trailer; the chunk parser uses this to close the current
    /// macro scope rather than attaching anything to it.
    EndSubckt,
}

/// A per-dialect grammar: recognizes declarations, instances and include
/// directives, and tells the scanner where macro scopes begin and end.
pub trait FormatStrategy: crate::scanner::ScanStrategy {
    /// Parses one already-folded logical line.
    ///
    /// `is_first_content_line` is set for the first non-comment physical
    /// line of a whole-file region, so the strategy can apply its title-line
    /// skip rule.
    fn parse_line(&self, line: &str, is_first_content_line: bool) -> LineResult;
}
