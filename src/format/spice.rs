//! The SPICE dialect: directive grammar, macro delimiters, and the
//! "last-positional-token" instance-parsing algorithm.

use arcstr::ArcStr;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{Child, Instance, Macro, Model, PrimitiveKind};
use crate::region::{IncludeDirective, LibraryDirective};
use crate::scanner::ScanStrategy;

use super::{Declaration, FormatStrategy, LineResult};

lazy_static! {
    static ref RE_SUBCKT: Regex =
        Regex::new(r"(?i)^\s*\.subckt\s+(\S+)(.*)$").unwrap();
    static ref RE_ENDS: Regex = Regex::new(r"(?i)^\s*\.ends\b").unwrap();
    static ref RE_MODEL: Regex =
        Regex::new(r"(?i)^\s*\.model\s+(\S+)\s+(\S+)(.*)$").unwrap();
    static ref RE_INCLUDE: Regex =
        Regex::new(r#"(?i)^\s*\.include\s+['"]?([^'"\s]+)['"]?\s*$"#).unwrap();
    static ref RE_LIB_DIRECTIVE: Regex =
        Regex::new(r#"(?i)^\s*\.lib\s+['"]?([^'"\s]+)['"]?\s+(\S+)\s*$"#).unwrap();
    static ref RE_LIB_SECTION_ONLY: Regex =
        Regex::new(r#"(?i)^\s*\.lib\s+['"]?([^'"\s]+)['"]?\s*$"#).unwrap();
    static ref RE_CADENCE_STRICT_INCLUDE: Regex =
        Regex::new(r#"^\s*\[\!\s*([^\]]+?)\s*\]\s*$"#).unwrap();
    static ref RE_CADENCE_LENIENT_INCLUDE: Regex =
        Regex::new(r#"^\s*\[\?\s*([^\]]+?)\s*\]\s*$"#).unwrap();
}

/// Recognizes the SPICE grammar described in SPEC_FULL.md §4.4/§6.
pub struct SpiceFormat;

impl SpiceFormat {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpiceFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStrategy for SpiceFormat {
    fn matches_macro_start(&self, line: &str) -> Option<(ArcStr, ArcStr)> {
        let caps = RE_SUBCKT.captures(line)?;
        let name = caps.get(1)?.as_str();
        Some((ArcStr::from(".subckt"), ArcStr::from(name)))
    }

    fn matches_macro_end(&self, line: &str) -> bool {
        RE_ENDS.is_match(line)
    }
}

impl FormatStrategy for SpiceFormat {
    fn parse_line(&self, line: &str, is_first_content_line: bool) -> LineResult {
        if is_first_content_line && !line.trim_start().starts_with('.') {
            return LineResult::None;
        }

        if let Some(caps) = RE_SUBCKT.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let (ports, _params) = split_positional_and_params(rest);
            let ports = ports.into_iter().map(crate::model::Port::new).collect();
            return LineResult::Declaration(Declaration::Subckt(Macro::new(name, ports)));
        }

        if RE_ENDS.is_match(line) {
            return LineResult::Declaration(Declaration::EndSubckt);
        }

        if let Some(caps) = RE_MODEL.captures(line) {
            let name = caps.get(1).unwrap().as_str();
            let base_type = caps.get(2).unwrap().as_str();
            let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let (flags, params) = split_positional_and_params(rest);
            let mut params: IndexMap<ArcStr, ArcStr> = params
                .into_iter()
                .map(|(k, v)| (ArcStr::from(k), ArcStr::from(v)))
                .collect();
            for flag in flags {
                params.insert(ArcStr::from(flag), ArcStr::from("true"));
            }
            return LineResult::Declaration(Declaration::Model(Model {
                name: ArcStr::from(name),
                base_type: ArcStr::from(base_type),
                params,
            }));
        }

        if let Some(directive) = self.parse_include(line) {
            return directive;
        }

        if let Some(instance) = self.parse_instance(line) {
            return LineResult::Instance(instance);
        }

        LineResult::None
    }
}

impl SpiceFormat {
    fn parse_include(&self, line: &str) -> Option<LineResult> {
        if let Some(caps) = RE_CADENCE_STRICT_INCLUDE.captures(line) {
            return Some(LineResult::Include(IncludeDirective {
                filepath: unquote(caps.get(1).unwrap().as_str()),
                source_file: Default::default(),
                strict: true,
            }));
        }
        if let Some(caps) = RE_CADENCE_LENIENT_INCLUDE.captures(line) {
            return Some(LineResult::Include(IncludeDirective {
                filepath: unquote(caps.get(1).unwrap().as_str()),
                source_file: Default::default(),
                strict: false,
            }));
        }
        if let Some(caps) = RE_LIB_DIRECTIVE.captures(line) {
            return Some(LineResult::Library(LibraryDirective {
                filepath: unquote(caps.get(1).unwrap().as_str()),
                source_file: Default::default(),
                strict: true,
                section: Some(caps.get(2).unwrap().as_str().to_string()),
            }));
        }
        if let Some(caps) = RE_INCLUDE.captures(line) {
            return Some(LineResult::Include(IncludeDirective {
                filepath: unquote(caps.get(1).unwrap().as_str()),
                source_file: Default::default(),
                strict: true,
            }));
        }
        None
    }

    /// The last-positional-token instance-parsing algorithm (SPEC_FULL.md
    /// §4.4). Returns `None` when the leading character does not select a
    /// known primitive or subcircuit prefix.
    fn parse_instance(&self, line: &str) -> Option<Instance> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }
        let name = tokens[0];
        let prefix = name.chars().next()?;
        let upper = prefix.to_ascii_uppercase();

        let is_subckt = upper == 'X';
        let is_mosfet = upper == 'M';
        let primitive = PrimitiveKind::from_prefix(upper);
        if primitive.is_none() && !is_subckt && !is_mosfet {
            return None;
        }

        tokens.remove(0);

        let mut params: IndexMap<ArcStr, ArcStr> = IndexMap::new();
        let mut positional: Vec<&str> = Vec::new();
        for tok in tokens {
            if let Some(eq) = tok.find('=') {
                let (k, v) = tok.split_at(eq);
                let v = &v[1..];
                if !k.is_empty() {
                    params.insert(ArcStr::from(k), ArcStr::from(v));
                    continue;
                }
            }
            positional.push(tok);
        }

        let mut definition_name: Option<ArcStr> = None;

        if let Some(prim) = primitive {
            match prim {
                PrimitiveKind::Resistor | PrimitiveKind::Capacitor | PrimitiveKind::Inductor => {
                    if let Some(last) = positional.last() {
                        if looks_numeric(last) {
                            params.insert(ArcStr::from("value"), ArcStr::from(*last));
                            positional.pop();
                        }
                    }
                }
                PrimitiveKind::Diode => {
                    // Non-passive but already resolved: the trailing token is
                    // still a model-name reference, just one the diode
                    // primitive doesn't need. Pop it so it doesn't leak into
                    // the net list.
                    positional.pop();
                }
                PrimitiveKind::Nmos | PrimitiveKind::Pmos => {}
            }
        }

        if definition_name.is_none() && (is_subckt || is_mosfet) {
            if let Some(last) = positional.pop() {
                definition_name = Some(ArcStr::from(last));
            }
        }

        let mut nets: IndexMap<ArcStr, Option<crate::model::Port>> = IndexMap::new();
        for tok in positional {
            nets.entry(ArcStr::from(tok)).or_insert(None);
        }

        let resolved_primitive = if is_mosfet {
            None
        } else {
            primitive
        };

        Some(Instance {
            name: ArcStr::from(name),
            nets,
            params,
            definition: resolved_primitive.map(crate::model::Definition::Primitive),
            definition_name: if resolved_primitive.is_some() {
                None
            } else {
                definition_name
            },
            parent: None,
        })
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn looks_numeric(tok: &str) -> bool {
    tok.chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '.' || c == '+' || c == '-')
        .unwrap_or(false)
}

/// Splits a `.subckt`/`.model` trailer into (positional tokens, key=value
/// pairs), in the order they appeared.
fn split_positional_and_params(rest: &str) -> (Vec<String>, Vec<(String, String)>) {
    let mut positional = Vec::new();
    let mut params = Vec::new();
    for tok in rest.split_whitespace() {
        if let Some(eq) = tok.find('=') {
            let (k, v) = tok.split_at(eq);
            params.push((k.to_string(), v[1..].to_string()));
        } else {
            positional.push(tok.to_string());
        }
    }
    (positional, params)
}

/// Builds a shallow macro/primitive definition from raw library content,
/// used by the model registry's library resolver (SPEC_FULL.md §4.5).
pub fn resolve_from_library_content(name: &str, content: &str) -> Option<crate::model::Definition> {
    for (idx, line) in content.lines().enumerate() {
        if let Some(caps) = RE_SUBCKT.captures(line) {
            let subckt_name = caps.get(1).unwrap().as_str();
            if subckt_name.eq_ignore_ascii_case(name) {
                let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let (port_names, _) = split_positional_and_params(rest);
                let ports = port_names
                    .into_iter()
                    .map(crate::model::Port::new)
                    .collect();
                let mut macro_ = Macro::new(subckt_name, ports);
                for body_line in content.lines().skip(idx + 1) {
                    if RE_ENDS.is_match(body_line) {
                        break;
                    }
                    if let Some(inst) = parse_mosfet_child(body_line) {
                        macro_.children.push(Child::Instance(inst));
                    }
                }
                return Some(crate::model::Definition::Macro(std::sync::Arc::new(macro_)));
            }
        }
        if let Some(caps) = RE_MODEL.captures(line) {
            let model_name = caps.get(1).unwrap().as_str();
            if model_name.eq_ignore_ascii_case(name) {
                let base_type = caps.get(2).unwrap().as_str();
                return PrimitiveKind::from_base_type(base_type)
                    .map(crate::model::Definition::Primitive);
            }
        }
    }
    None
}

/// Shallow MOSFET-only child parsing within a library subcircuit body:
/// `m<name> d g s b model [params]`.
fn parse_mosfet_child(line: &str) -> Option<Instance> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let name = tokens[0];
    if !name.starts_with(['m', 'M']) {
        return None;
    }
    tokens.remove(0);
    if tokens.len() < 5 {
        return None;
    }

    let mut params: IndexMap<ArcStr, ArcStr> = IndexMap::new();
    let mut positional: Vec<&str> = Vec::new();
    for tok in tokens {
        if let Some(eq) = tok.find('=') {
            let (k, v) = tok.split_at(eq);
            params.insert(ArcStr::from(k), ArcStr::from(&v[1..]));
        } else {
            positional.push(tok);
        }
    }
    if positional.len() < 5 {
        return None;
    }
    let model = positional.pop().unwrap();
    let mut nets = IndexMap::new();
    for tok in positional {
        nets.entry(ArcStr::from(tok)).or_insert(None);
    }

    Some(Instance {
        name: ArcStr::from(name),
        nets,
        params,
        definition: None,
        definition_name: Some(ArcStr::from(model)),
        parent: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resistor_instance() {
        let fmt = SpiceFormat::new();
        let inst = fmt.parse_instance("R1 in out 1k").unwrap();
        assert_eq!(inst.name.as_str(), "R1");
        assert_eq!(inst.nets.keys().map(|s| s.as_str()).collect::<Vec<_>>(), vec!["in", "out"]);
        assert_eq!(inst.params.get("value").unwrap().as_str(), "1k");
        assert!(matches!(
            inst.definition,
            Some(crate::model::Definition::Primitive(PrimitiveKind::Resistor))
        ));
    }

    #[test]
    fn parses_resistor_with_continuation_params() {
        let fmt = SpiceFormat::new();
        let inst = fmt.parse_instance("R1 a b 10k tc=0.001").unwrap();
        assert_eq!(inst.params.get("value").unwrap().as_str(), "10k");
        assert_eq!(inst.params.get("tc").unwrap().as_str(), "0.001");
    }

    #[test]
    fn parses_diode_instance_and_consumes_trailing_model_token() {
        let fmt = SpiceFormat::new();
        let inst = fmt.parse_instance("D1 a k dmod").unwrap();
        assert_eq!(
            inst.nets.keys().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["a", "k"]
        );
        assert!(matches!(
            inst.definition,
            Some(crate::model::Definition::Primitive(PrimitiveKind::Diode))
        ));
    }

    #[test]
    fn parses_subckt_instance_with_unresolved_definition() {
        let fmt = SpiceFormat::new();
        let inst = fmt.parse_instance("XI inA outA inv").unwrap();
        assert_eq!(inst.definition_name.as_deref(), Some("inv"));
        assert_eq!(
            inst.nets.keys().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["inA", "outA"]
        );
    }

    #[test]
    fn parses_mosfet_as_unresolved() {
        let fmt = SpiceFormat::new();
        let inst = fmt.parse_instance("M1 y a 0 0 nmos W=1u L=0.1u").unwrap();
        assert_eq!(inst.definition_name.as_deref(), Some("nmos"));
        assert_eq!(inst.params.get("W").unwrap().as_str(), "1u");
        assert_eq!(inst.params.get("L").unwrap().as_str(), "0.1u");
    }

    #[test]
    fn unknown_prefix_is_not_an_instance() {
        let fmt = SpiceFormat::new();
        assert!(fmt.parse_instance("Zfoo a b").is_none());
    }

    #[test]
    fn parses_subckt_header() {
        let fmt = SpiceFormat::new();
        match fmt.parse_line(".subckt inv a y", false) {
            LineResult::Declaration(Declaration::Subckt(m)) => {
                assert_eq!(m.name.as_str(), "inv");
                assert_eq!(m.ports.len(), 2);
            }
            _ => panic!("expected subckt declaration"),
        }
    }

    #[test]
    fn title_line_is_skipped_unless_directive() {
        let fmt = SpiceFormat::new();
        assert!(matches!(fmt.parse_line("* just a title", true), LineResult::None));
        assert!(matches!(fmt.parse_line("not a directive either", true), LineResult::None));
        match fmt.parse_line(".subckt inv a y", true) {
            LineResult::Declaration(Declaration::Subckt(_)) => {}
            _ => panic!("expected directive to survive title position"),
        }
    }

    #[test]
    fn parses_include_and_cadence_brackets() {
        let fmt = SpiceFormat::new();
        assert!(matches!(fmt.parse_line(".include \"foo.sp\"", false), LineResult::Include(_)));
        assert!(matches!(fmt.parse_line("[! foo.sp ]", false), LineResult::Include(_)));
        assert!(matches!(fmt.parse_line("[? foo.sp ]", false), LineResult::Include(_)));
    }

    #[test]
    fn parses_library_directive_with_section() {
        let fmt = SpiceFormat::new();
        match fmt.parse_line(".lib \"corners.lib\" tt", false) {
            LineResult::Library(lib) => {
                assert_eq!(lib.filepath, "corners.lib");
                assert_eq!(lib.section.as_deref(), Some("tt"));
            }
            _ => panic!("expected library directive"),
        }
    }

    #[test]
    fn resolves_nmos_model_from_library_content() {
        let content = ".model nch nmos\n";
        let def = resolve_from_library_content("nch", content).unwrap();
        assert!(matches!(
            def,
            crate::model::Definition::Primitive(PrimitiveKind::Nmos)
        ));
    }

    #[test]
    fn resolves_subckt_with_shallow_mosfet_children_from_library_content() {
        let content = ".subckt inv a y\nM1 y a 0 0 nmos\n.ends\n";
        let def = resolve_from_library_content("inv", content).unwrap();
        match def {
            crate::model::Definition::Macro(m) => {
                assert_eq!(m.ports.len(), 2);
                assert_eq!(m.children.len(), 1);
            }
            _ => panic!("expected macro"),
        }
    }
}
