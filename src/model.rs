//! The in-memory cell model: ports, primitives, macros, models and instances.

use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::error::{LinkError, ParseError};

/// A named, order-significant terminal on a cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Port {
    pub name: ArcStr,
}

impl Port {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self { name: name.into() }
    }
}

/// The built-in device kinds known to the engine without any library lookup.
///
/// Primitives are value-typed: two primitives of the same kind compare and
/// hash equal regardless of where they were produced, matching the
/// "singleton" primitive pattern of the source model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Resistor,
    Capacitor,
    Inductor,
    Nmos,
    Pmos,
    Diode,
}

impl PrimitiveKind {
    /// Canonical lowercase name, used as the model-registry lookup key and in
    /// the written dump.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Resistor => "resistor",
            PrimitiveKind::Capacitor => "capacitor",
            PrimitiveKind::Inductor => "inductor",
            PrimitiveKind::Nmos => "nmos",
            PrimitiveKind::Pmos => "pmos",
            PrimitiveKind::Diode => "diode",
        }
    }

    /// Ordered port list, a language-neutral contract fixed by the device
    /// physics, not by any particular file's port naming.
    pub fn ports(&self) -> &'static [&'static str] {
        match self {
            PrimitiveKind::Resistor | PrimitiveKind::Capacitor | PrimitiveKind::Inductor => {
                &["a", "b"]
            }
            PrimitiveKind::Nmos | PrimitiveKind::Pmos => &["d", "g", "s", "b"],
            PrimitiveKind::Diode => &["a", "k"],
        }
    }

    /// The instance-name prefix character (uppercased) that selects this
    /// primitive during instance parsing, when applicable directly (mosfets
    /// additionally require a `.model`/name lookup to pick nmos vs pmos).
    pub fn from_prefix(prefix: char) -> Option<PrimitiveKind> {
        match prefix.to_ascii_uppercase() {
            'R' => Some(PrimitiveKind::Resistor),
            'C' => Some(PrimitiveKind::Capacitor),
            'L' => Some(PrimitiveKind::Inductor),
            'D' => Some(PrimitiveKind::Diode),
            _ => None,
        }
    }

    /// Maps a library `.model <name> <base_type>` base-type string to a
    /// primitive kind, per the shallow library content resolver.
    pub fn from_base_type(base_type: &str) -> Option<PrimitiveKind> {
        match base_type.to_ascii_lowercase().as_str() {
            "nmos" | "nmos3" | "nmos4" => Some(PrimitiveKind::Nmos),
            "pmos" | "pmos3" | "pmos4" => Some(PrimitiveKind::Pmos),
            "res" | "resistor" => Some(PrimitiveKind::Resistor),
            "cap" | "capacitor" => Some(PrimitiveKind::Capacitor),
            "ind" | "inductor" => Some(PrimitiveKind::Inductor),
            "diode" | "d" => Some(PrimitiveKind::Diode),
            _ => None,
        }
    }

    pub fn port_list(&self) -> Vec<Port> {
        self.ports().iter().map(|p| Port::new(*p)).collect()
    }
}

/// A resolved reference to either a user-defined [`Macro`] or a built-in
/// [`PrimitiveKind`].
#[derive(Clone, Debug)]
pub enum Definition {
    Macro(Arc<Macro>),
    Primitive(PrimitiveKind),
}

impl Definition {
    pub fn ports(&self) -> Vec<Port> {
        match self {
            Definition::Macro(m) => m.ports.clone(),
            Definition::Primitive(p) => p.port_list(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Definition::Macro(m) => m.name.to_string(),
            Definition::Primitive(p) => p.name().to_string(),
        }
    }
}

/// A user-defined subcircuit: name, ordered ports, ordered children.
#[derive(Clone, Debug)]
pub struct Macro {
    pub name: ArcStr,
    pub ports: Vec<Port>,
    pub children: Vec<Child>,
}

impl Macro {
    pub fn new(name: impl Into<ArcStr>, ports: Vec<Port>) -> Self {
        Self {
            name: name.into(),
            ports,
            children: Vec::new(),
        }
    }
}

/// A named binding of a primitive base type to a set of parameters, as
/// produced by a bare `.model` declaration.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: ArcStr,
    pub base_type: ArcStr,
    pub params: IndexMap<ArcStr, ArcStr>,
}

/// An element nested inside a [`Macro`]'s body.
#[derive(Clone, Debug)]
pub enum Child {
    Instance(Instance),
    Model(Model),
    /// A subcircuit declared inline within another macro's scope. The
    /// scanner's depth tracking captures the whole nested block as part of
    /// the enclosing region, so the chunk parser surfaces it here rather
    /// than splitting it into a separate top-level cell.
    Macro(Arc<Macro>),
}

/// A use of a Macro or Primitive at a call site.
#[derive(Clone, Debug)]
pub struct Instance {
    pub name: ArcStr,
    /// Net name -> formal port, in the order nets were declared at the call
    /// site. Populated once the instance is resolved against its definition;
    /// before linking this is empty and `definition_name` is authoritative.
    pub nets: IndexMap<ArcStr, Option<Port>>,
    pub params: IndexMap<ArcStr, ArcStr>,
    pub definition: Option<Definition>,
    pub definition_name: Option<ArcStr>,
    pub parent: Option<ArcStr>,
}

impl Instance {
    pub fn is_primitive(&self) -> bool {
        matches!(self.definition, Some(Definition::Primitive(_)))
    }
}

/// The fully linked output of the pipeline.
#[derive(Clone, Debug, Default)]
pub struct Netlist {
    pub name: ArcStr,
    /// Unique primitives actually referenced by the linked design.
    pub primitives: IndexMap<&'static str, PrimitiveKind>,
    /// Macros in topological dependency order: a macro appears before every
    /// macro it directly instantiates.
    pub macros: IndexMap<ArcStr, Arc<Macro>>,
    /// Instances with no enclosing macro.
    pub top_instances: Vec<Instance>,
    /// Best-effort syntax errors accumulated across every parsed region.
    pub parse_errors: Vec<ParseError>,
    /// Best-effort structural errors discovered while linking.
    pub link_errors: Vec<LinkError>,
}

impl Netlist {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            primitives: IndexMap::new(),
            macros: IndexMap::new(),
            top_instances: Vec::new(),
            parse_errors: Vec::new(),
            link_errors: Vec::new(),
        }
    }

    /// A virtual top-level macro synthesized from the top instances, with no
    /// name and no ports, used as the entry point for graph projection.
    pub fn top(&self) -> Macro {
        Macro {
            name: ArcStr::from(""),
            ports: Vec::new(),
            children: self
                .top_instances
                .iter()
                .cloned()
                .map(Child::Instance)
                .collect(),
        }
    }
}
