//! Logical-line folding and per-region dispatch into cells, directives and
//! errors.

use std::path::PathBuf;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::instrument;

use crate::error::ParseError;
use crate::format::{Declaration, FormatStrategy, LineResult};
use crate::model::{Child, Macro};
use crate::region::{IncludeDirective, LibraryDirective, ParseRegion, RegionType};

lazy_static! {
    static ref EQUALS_WHITESPACE: Regex = Regex::new(r"\s*=\s*").unwrap();
}

/// Everything discovered while parsing a single [`ParseRegion`].
#[derive(Debug, Default)]
pub struct ParseResult {
    pub filepath: PathBuf,
    pub cells: Vec<Child>,
    pub errors: Vec<ParseError>,
    pub includes: Vec<IncludeDirective>,
    pub libraries: Vec<LibraryDirective>,
}

struct MacroBuilder {
    macro_: Macro,
    header_line: usize,
}

/// Folds and dispatches one region's bytes.
#[instrument(skip(region, bytes, format), fields(path = %region.filepath.display(), start = region.start_byte, end = region.end_byte))]
pub fn parse_region(region: &ParseRegion, bytes: &[u8], format: &dyn FormatStrategy) -> ParseResult {
    let end = if region.end_byte < 0 {
        bytes.len()
    } else {
        (region.end_byte as usize).min(bytes.len())
    };
    let start = region.start_byte.min(end);
    let slice = &bytes[start..end];
    let text = String::from_utf8_lossy(slice);

    let mut result = ParseResult {
        filepath: region.filepath.clone(),
        ..Default::default()
    };

    let mut stack: Vec<MacroBuilder> = Vec::new();
    let is_whole_file = region.start_byte == 0;

    let mut current: Option<(usize, String)> = None;
    let mut line_number = 0usize;

    // The title slot is the region's first *physical* line, full stop. A
    // comment there is dropped by the ordinary comment rule above and never
    // reaches `current`, so it consumes the slot without this flag ever
    // applying to whatever statement follows it.
    let mut flush = |current: &mut Option<(usize, String)>,
                     stack: &mut Vec<MacroBuilder>,
                     result: &mut ParseResult| {
        if let Some((started_at, raw)) = current.take() {
            let normalized = EQUALS_WHITESPACE.replace_all(raw.trim(), "=").into_owned();
            if normalized.is_empty() {
                return;
            }
            let is_first = is_whole_file && started_at == 1;
            dispatch_line(
                &normalized,
                started_at,
                is_first,
                format,
                stack,
                result,
            );
        }
    };

    for raw_line in text.split('\n') {
        line_number += 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim_start();

        if trimmed.starts_with('*') || trimmed.starts_with('$') {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('+') {
            match &mut current {
                Some((_, buf)) => {
                    buf.push(' ');
                    buf.push_str(rest.trim());
                }
                None => {
                    current = Some((line_number, rest.trim().to_string()));
                }
            }
            continue;
        }

        flush(&mut current, &mut stack, &mut result);

        if trimmed.is_empty() {
            current = None;
        } else {
            current = Some((line_number, trimmed.to_string()));
        }
    }
    flush(&mut current, &mut stack, &mut result);

    while let Some(builder) = stack.pop() {
        result.errors.push(ParseError::new(
            builder.header_line,
            format!("subckt '{}' has no matching .ends", builder.macro_.name),
            None,
        ));
        attach_macro(&mut stack, &mut result, builder.macro_);
    }

    result
}

fn dispatch_line(
    line: &str,
    line_number: usize,
    is_first: bool,
    format: &dyn FormatStrategy,
    stack: &mut Vec<MacroBuilder>,
    result: &mut ParseResult,
) {
    match format.parse_line(line, is_first) {
        LineResult::Declaration(Declaration::Subckt(mut m)) => {
            m.children.clear();
            stack.push(MacroBuilder {
                macro_: m,
                header_line: line_number,
            });
        }
        LineResult::Declaration(Declaration::EndSubckt) => {
            if let Some(builder) = stack.pop() {
                attach_macro(stack, result, builder.macro_);
            }
        }
        LineResult::Declaration(Declaration::Model(model)) => {
            attach_child(stack, result, Child::Model(model));
        }
        LineResult::Instance(mut inst) => {
            inst.parent = stack.last().map(|b| b.macro_.name.clone());
            attach_child(stack, result, Child::Instance(inst));
        }
        LineResult::Include(inc) => {
            result.includes.push(IncludeDirective {
                source_file: result.filepath.clone(),
                ..inc
            });
        }
        LineResult::Library(lib) => {
            result.libraries.push(LibraryDirective {
                source_file: result.filepath.clone(),
                ..lib
            });
        }
        LineResult::None => {}
    }
}

fn attach_child(stack: &mut [MacroBuilder], result: &mut ParseResult, child: Child) {
    if let Some(builder) = stack.last_mut() {
        builder.macro_.children.push(child);
    } else {
        result.cells.push(child);
    }
}

fn attach_macro(stack: &mut Vec<MacroBuilder>, result: &mut ParseResult, macro_: Macro) {
    let child = Child::Macro(Arc::new(macro_));
    if let Some(parent) = stack.last_mut() {
        parent.macro_.children.push(child);
    } else {
        result.cells.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::spice::SpiceFormat;

    fn parse(src: &str, region_type: RegionType) -> ParseResult {
        let format = SpiceFormat::new();
        let region = ParseRegion {
            filepath: PathBuf::from("in.sp"),
            start_byte: 0,
            end_byte: -1,
            region_type,
            context_delimiter: None,
            context_name: None,
        };
        parse_region(&region, src.as_bytes(), &format)
    }

    #[test]
    fn skips_title_line_on_whole_file_global_region() {
        let result = parse("this is a title\nR1 a b 1k\n", RegionType::Global);
        assert_eq!(result.cells.len(), 1);
    }

    #[test]
    fn comment_title_consumes_the_slot_without_dropping_the_next_statement() {
        let result = parse("*title\nR1 in out 1k\nR2 out gnd 1k\n", RegionType::Global);
        assert_eq!(result.cells.len(), 2);
    }

    #[test]
    fn directive_in_title_position_is_kept() {
        let result = parse(".include foo.sp\nR1 a b 1k\n", RegionType::Global);
        assert_eq!(result.includes.len(), 1);
        assert_eq!(result.cells.len(), 1);
    }

    #[test]
    fn folds_continuation_lines() {
        let result = parse("*t\nR1 a b\n+ 10k tc=0.001\n", RegionType::Global);
        assert_eq!(result.cells.len(), 1);
        match &result.cells[0] {
            Child::Instance(inst) => {
                assert_eq!(inst.params.get("value").unwrap().as_str(), "10k");
                assert_eq!(inst.params.get("tc").unwrap().as_str(), "0.001");
            }
            _ => panic!("expected instance"),
        }
    }

    #[test]
    fn comment_does_not_break_continuation() {
        let result = parse("*t\nR1 a b\n* a comment\n+ 10k\n", RegionType::Global);
        match &result.cells[0] {
            Child::Instance(inst) => {
                assert_eq!(inst.params.get("value").unwrap().as_str(), "10k");
            }
            _ => panic!("expected instance"),
        }
    }

    #[test]
    fn parses_macro_region_into_single_macro_cell() {
        let result = parse(
            ".subckt inv a y\nM1 y a 0 0 nmos W=1u\n.ends\n",
            RegionType::Macro,
        );
        assert_eq!(result.cells.len(), 1);
        match &result.cells[0] {
            Child::Macro(m) => {
                assert_eq!(m.name.as_str(), "inv");
                assert_eq!(m.children.len(), 1);
            }
            _ => panic!("expected macro"),
        }
    }

    #[test]
    fn nested_subckt_is_attached_to_parent_macro() {
        let result = parse(
            ".subckt outer a b\n.subckt inner a b\nR1 a b 1k\n.ends\nXI a b inner\n.ends\n",
            RegionType::Macro,
        );
        assert_eq!(result.cells.len(), 1);
        match &result.cells[0] {
            Child::Macro(outer) => {
                assert_eq!(outer.children.len(), 2);
                assert!(matches!(outer.children[0], Child::Macro(_)));
                assert!(matches!(outer.children[1], Child::Instance(_)));
            }
            _ => panic!("expected macro"),
        }
    }

    #[test]
    fn unterminated_subckt_is_flushed_with_error() {
        let result = parse(".subckt foo a b\nR1 a b 1k\n", RegionType::Global);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.cells.len(), 1);
    }

    #[test]
    fn empty_file_has_no_cells_or_errors() {
        let result = parse("", RegionType::Global);
        assert!(result.cells.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn title_only_file_has_no_cells() {
        let result = parse("just a title\n", RegionType::Global);
        assert!(result.cells.is_empty());
    }
}
