//! Library section extraction: slicing a `.lib <name> ... .endl` byte range
//! out of a library file, independent of any particular owning directive.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SECTION_START: Regex = Regex::new(r"(?im)^\s*\.lib\s+(\S+)\s*$").unwrap();
    static ref SECTION_END: Regex = Regex::new(r"(?im)^\s*\.endl\b").unwrap();
}

/// Locates the named section within `content` and returns its byte range,
/// `[start, end)`, where `start` is the offset just *after* the `.lib`
/// header line (so the parser never re-sees it as a directive) and `end` is
/// the offset of the next `.endl`, or the end of the content if absent.
///
/// Matching is case-insensitive and does not track nested `.lib`/`.endl`
/// pairs (see SPEC_FULL.md §9, open question (i)): the first `.endl`
/// following the matched header always closes the section.
pub fn find_section(content: &str, section_name: &str) -> Option<(usize, usize)> {
    for caps in SECTION_START.captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let name = caps.get(1).unwrap().as_str();
        if name.eq_ignore_ascii_case(section_name) {
            let start = whole.end();
            // Skip the newline that terminates the header line, if present.
            let start = content[start..]
                .find('\n')
                .map(|p| start + p + 1)
                .unwrap_or(content.len());
            let end = SECTION_END
                .find_at(content, start)
                .map(|m| m.start())
                .unwrap_or(content.len());
            return Some((start, end));
        }
    }
    None
}

/// Lists every section name declared via `.lib <name>` headers, in order of
/// appearance.
pub fn list_sections(content: &str) -> Vec<String> {
    SECTION_START
        .captures_iter(content)
        .map(|c| c.get(1).unwrap().as_str().to_string())
        .collect()
}
