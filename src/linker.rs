//! The linker: builds the macro table, resolves instances against it and
//! against the model registry, and orders macros by dependency.

use std::collections::HashSet;
use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::instrument;
use unicase::UniCase;

use crate::compiler::Aggregate;
use crate::error::{LinkError, LinkErrorKind};
use crate::model::{Child, Definition, Instance, Macro, Netlist, PrimitiveKind};
use crate::registry::ModelRegistry;

type Key = UniCase<ArcStr>;

/// Links a compiled [`Aggregate`] into a fully resolved [`Netlist`].
#[instrument(skip(name, aggregate))]
pub fn link(name: impl Into<ArcStr>, aggregate: Aggregate) -> Netlist {
    let name = name.into();
    let mut netlist = Netlist::new(name);
    netlist.parse_errors = aggregate.errors;

    let mut registry = ModelRegistry::new();
    for (path, content) in aggregate.library_contents {
        registry.register_library_content(path, content);
    }

    let mut raw_macros: IndexMap<Key, Arc<Macro>> = IndexMap::new();
    build_macro_table(&aggregate.cells, &mut registry, &mut raw_macros, &mut netlist.link_errors);

    // Post-order, memoized resolution: a macro is only finalized once, after
    // every instance it directly contains (including ones nested one or more
    // subckt levels down) has had its definition resolved against the
    // registry and its nets zipped to the definition's formal ports.
    let mut done: IndexMap<Key, Arc<Macro>> = IndexMap::new();
    let mut in_progress: HashSet<Key> = HashSet::new();
    for key in raw_macros.keys().cloned().collect::<Vec<_>>() {
        finalize_macro(&key, &raw_macros, &registry, &mut in_progress, &mut done, &mut netlist.link_errors);
    }

    let top_instances: Vec<Instance> = aggregate
        .cells
        .iter()
        .filter_map(|cell| match cell {
            Child::Instance(inst) => Some(resolve_instance(
                inst.clone(),
                &raw_macros,
                &registry,
                &mut in_progress,
                &mut done,
                &mut netlist.link_errors,
            )),
            _ => None,
        })
        .collect();

    let mut primitives: IndexMap<&'static str, PrimitiveKind> = IndexMap::new();
    for inst in &top_instances {
        collect_primitive(inst, &mut primitives);
    }
    for m in done.values() {
        collect_primitives_in_macro(m, &mut primitives);
    }

    let order = topological_order(&done, &mut netlist.link_errors);
    netlist.macros = order
        .into_iter()
        .map(|key| {
            let m = done.get(&key).unwrap().clone();
            (key.into_inner(), m)
        })
        .collect();
    netlist.top_instances = top_instances;
    netlist.primitives = primitives;

    netlist
}

/// Recursively walks every cell, flattening each declared macro (at any
/// nesting depth) into a single global-by-name table and registering it with
/// the model registry. A name seen twice produces a
/// [`LinkErrorKind::DuplicateDefinition`]; the first definition wins.
fn build_macro_table(
    cells: &[Child],
    registry: &mut ModelRegistry,
    raw_macros: &mut IndexMap<Key, Arc<Macro>>,
    link_errors: &mut Vec<LinkError>,
) {
    for cell in cells {
        if let Child::Macro(m) = cell {
            let key = UniCase::new(m.name.clone());
            if raw_macros.contains_key(&key) {
                link_errors.push(LinkError::new(
                    LinkErrorKind::DuplicateDefinition,
                    format!("subcircuit '{}' is defined more than once", m.name),
                    vec![m.name.to_string()],
                ));
            } else {
                raw_macros.insert(key, m.clone());
                registry.register_macro(m.clone());
            }
            build_macro_table(&m.children, registry, raw_macros, link_errors);
        }
    }
}

/// Resolves `inst`'s definition and model name, recursively finalizing the
/// macro it references (if any) so the attached [`Definition::Macro`] is
/// itself fully resolved rather than a raw, as-parsed copy.
fn resolve_instance(
    mut inst: Instance,
    raw_macros: &IndexMap<Key, Arc<Macro>>,
    registry: &ModelRegistry,
    in_progress: &mut HashSet<Key>,
    done: &mut IndexMap<Key, Arc<Macro>>,
    link_errors: &mut Vec<LinkError>,
) -> Instance {
    if inst.definition.is_none() {
        if let Some(name) = inst.definition_name.clone() {
            match registry.resolve(&name) {
                Some(Definition::Macro(m)) => {
                    let key = UniCase::new(m.name.clone());
                    let finalized =
                        finalize_macro(&key, raw_macros, registry, in_progress, done, link_errors);
                    inst.definition = Some(Definition::Macro(finalized));
                }
                Some(Definition::Primitive(p)) => {
                    inst.definition = Some(Definition::Primitive(p));
                }
                None => {
                    link_errors.push(LinkError::new(
                        LinkErrorKind::UndefinedModel,
                        format!("instance '{}' references undefined model '{}'", inst.name, name),
                        vec![inst.name.to_string()],
                    ));
                }
            }
        }
    }

    if let Some(def) = &inst.definition {
        let ports = def.ports();
        let mut zipped: IndexMap<ArcStr, Option<crate::model::Port>> = IndexMap::new();
        for (i, net_name) in inst.nets.keys().enumerate() {
            zipped.insert(net_name.clone(), ports.get(i).cloned());
        }
        inst.nets = zipped;
    }

    inst
}

/// Finalizes `key` if not already done: resolves every direct and nested
/// instance, replacing embedded macro references with their own finalized
/// forms. Macros involved in a reference cycle are returned in their raw,
/// unresolved-below form to break recursion rather than looping forever; the
/// cycle itself is reported separately once the full dependency graph is
/// built from the finalized tree.
fn finalize_macro(
    key: &Key,
    raw_macros: &IndexMap<Key, Arc<Macro>>,
    registry: &ModelRegistry,
    in_progress: &mut HashSet<Key>,
    done: &mut IndexMap<Key, Arc<Macro>>,
    link_errors: &mut Vec<LinkError>,
) -> Arc<Macro> {
    if let Some(finalized) = done.get(key) {
        return finalized.clone();
    }
    let Some(raw) = raw_macros.get(key) else {
        // Should not happen: every Definition::Macro comes from raw_macros.
        return Arc::new(Macro::new(key.clone().into_inner(), vec![]));
    };
    if !in_progress.insert(key.clone()) {
        return raw.clone();
    }

    let mut children = Vec::with_capacity(raw.children.len());
    for child in &raw.children {
        match child {
            Child::Instance(inst) => {
                let resolved = resolve_instance(
                    inst.clone(),
                    raw_macros,
                    registry,
                    in_progress,
                    done,
                    link_errors,
                );
                children.push(Child::Instance(resolved));
            }
            Child::Macro(nested) => {
                let nested_key = UniCase::new(nested.name.clone());
                let finalized =
                    finalize_macro(&nested_key, raw_macros, registry, in_progress, done, link_errors);
                children.push(Child::Macro(finalized));
            }
            Child::Model(m) => children.push(Child::Model(m.clone())),
        }
    }

    in_progress.remove(key);
    let result = Arc::new(Macro {
        name: raw.name.clone(),
        ports: raw.ports.clone(),
        children,
    });
    done.insert(key.clone(), result.clone());
    result
}

fn collect_primitive(inst: &Instance, primitives: &mut IndexMap<&'static str, PrimitiveKind>) {
    if let Some(Definition::Primitive(p)) = &inst.definition {
        primitives.entry(p.name()).or_insert(*p);
    }
}

fn collect_primitives_in_macro(macro_: &Arc<Macro>, primitives: &mut IndexMap<&'static str, PrimitiveKind>) {
    for child in &macro_.children {
        match child {
            Child::Instance(inst) => collect_primitive(inst, primitives),
            Child::Macro(nested) => collect_primitives_in_macro(nested, primitives),
            Child::Model(_) => {}
        }
    }
}

/// Orders macros so each one precedes its dependencies. A macro A depends on
/// macro B when A has a direct instance (not one nested inside a child
/// macro) whose resolved definition is B; the edge recorded is A → B, and A
/// appears before B in the returned order.
///
/// On a cycle, the macros are returned in their original table order and a
/// [`LinkErrorKind::CircularDependency`] is recorded; the writer and graph
/// projector both tolerate an unsorted macro table.
fn topological_order(done: &IndexMap<Key, Arc<Macro>>, link_errors: &mut Vec<LinkError>) -> Vec<Key> {
    let mut graph: DiGraph<Key, ()> = DiGraph::new();
    let mut node_of: IndexMap<Key, NodeIndex> = IndexMap::new();

    for key in done.keys() {
        let idx = graph.add_node(key.clone());
        node_of.insert(key.clone(), idx);
    }

    for (key, macro_) in done {
        let from = node_of[key];
        for child in &macro_.children {
            if let Child::Instance(inst) = child {
                if let Some(Definition::Macro(dep)) = &inst.definition {
                    let dep_key = UniCase::new(dep.name.clone());
                    if let Some(&to) = node_of.get(&dep_key) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|idx| graph[idx].clone()).collect(),
        Err(cycle) => {
            let offending = graph[cycle.node_id()].clone().into_inner().to_string();
            link_errors.push(LinkError::new(
                LinkErrorKind::CircularDependency,
                format!("macro dependency graph contains a cycle involving '{offending}'"),
                vec![offending],
            ));
            done.keys().cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::model::Port;

    fn aggregate_of(cells: Vec<Child>) -> Aggregate {
        Aggregate {
            cells,
            errors: Vec::new(),
            library_contents: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn instance(name: &str, nets: &[&str], definition_name: Option<&str>) -> Instance {
        Instance {
            name: ArcStr::from(name),
            nets: nets.iter().map(|n| (ArcStr::from(*n), None)).collect(),
            params: IndexMap::new(),
            definition: None,
            definition_name: definition_name.map(ArcStr::from),
            parent: None,
        }
    }

    #[test]
    fn resolves_primitive_instance_and_zips_ports() {
        let cells = vec![Child::Instance(Instance {
            definition: Some(Definition::Primitive(PrimitiveKind::Resistor)),
            ..instance("R1", &["a", "b"], None)
        })];
        let netlist = link("top", aggregate_of(cells));
        assert_eq!(netlist.top_instances.len(), 1);
        let nets = &netlist.top_instances[0].nets;
        assert_eq!(nets.get("a").unwrap().as_ref().unwrap().name.as_str(), "a");
        assert!(netlist.primitives.contains_key("resistor"));
    }

    #[test]
    fn undefined_model_produces_link_error() {
        let cells = vec![Child::Instance(instance("XI", &["a", "b"], Some("missing")))];
        let netlist = link("top", aggregate_of(cells));
        assert_eq!(netlist.link_errors.len(), 1);
        assert_eq!(netlist.link_errors[0].kind, LinkErrorKind::UndefinedModel);
    }

    #[test]
    fn duplicate_macro_definition_is_reported() {
        let m1 = Arc::new(Macro::new("inv", vec![Port::new("a"), Port::new("y")]));
        let m2 = Arc::new(Macro::new("inv", vec![Port::new("a"), Port::new("y")]));
        let netlist = link("top", aggregate_of(vec![Child::Macro(m1), Child::Macro(m2)]));
        assert_eq!(netlist.link_errors.len(), 1);
        assert_eq!(netlist.link_errors[0].kind, LinkErrorKind::DuplicateDefinition);
        assert_eq!(netlist.macros.len(), 1);
    }

    #[test]
    fn macro_instance_resolves_against_macro_table_including_nested_instances() {
        let mut inv = Macro::new("inv", vec![Port::new("a"), Port::new("y")]);
        inv.children.push(Child::Instance(instance("M1", &["y", "a", "0", "0"], None)));

        let cells = vec![
            Child::Macro(Arc::new(inv)),
            Child::Instance(instance("XI", &["in", "out"], Some("inv"))),
        ];
        let netlist = link("top", aggregate_of(cells));
        assert_eq!(netlist.top_instances.len(), 1);
        match &netlist.top_instances[0].definition {
            Some(Definition::Macro(m)) => {
                assert_eq!(m.name.as_str(), "inv");
                // The nested instance's nets were zipped against `inv`'s own
                // ports since M1 has no model here; confirm it still carries
                // through to the finalized macro stored on the instance.
                assert_eq!(m.children.len(), 1);
            }
            _ => panic!("expected resolved macro"),
        }
    }

    #[test]
    fn dependency_order_places_caller_before_callee() {
        let leaf = Macro::new("leaf", vec![]);
        let mut caller = Macro::new("caller", vec![]);
        caller
            .children
            .push(Child::Instance(instance("X1", &[], Some("leaf"))));

        let cells = vec![Child::Macro(Arc::new(leaf)), Child::Macro(Arc::new(caller))];
        let netlist = link("top", aggregate_of(cells));
        let names: Vec<&str> = netlist.macros.keys().map(|k| k.as_str()).collect();
        let leaf_pos = names.iter().position(|n| *n == "leaf").unwrap();
        let caller_pos = names.iter().position(|n| *n == "caller").unwrap();
        assert!(caller_pos < leaf_pos);
    }

    #[test]
    fn cyclic_macro_dependency_is_reported_without_panicking() {
        let mut a = Macro::new("a", vec![]);
        a.children.push(Child::Instance(instance("X1", &[], Some("b"))));
        let mut b = Macro::new("b", vec![]);
        b.children.push(Child::Instance(instance("X1", &[], Some("a"))));

        let cells = vec![Child::Macro(Arc::new(a)), Child::Macro(Arc::new(b))];
        let netlist = link("top", aggregate_of(cells));
        assert_eq!(netlist.macros.len(), 2);
        assert!(netlist
            .link_errors
            .iter()
            .any(|e| e.kind == LinkErrorKind::CircularDependency));
    }

    #[test]
    fn parse_errors_flow_through_from_aggregate() {
        let mut aggregate = aggregate_of(vec![]);
        aggregate.errors.push(ParseError::new(1, "bad line", None));
        let netlist = link("top", aggregate);
        assert_eq!(netlist.parse_errors.len(), 1);
    }
}
