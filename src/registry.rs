//! The model registry: merges static primitives, parsed macros and lazily
//! resolved library content behind a single `resolve` lookup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arcstr::ArcStr;
use unicase::UniCase;

use crate::format::spice::resolve_from_library_content;
use crate::model::{Definition, Macro, PrimitiveKind};

const STATIC_PRIMITIVES: &[PrimitiveKind] = &[
    PrimitiveKind::Resistor,
    PrimitiveKind::Capacitor,
    PrimitiveKind::Inductor,
    PrimitiveKind::Nmos,
    PrimitiveKind::Pmos,
    PrimitiveKind::Diode,
];

/// Resolves a textual model reference against static primitives, parsed
/// macros, and lazily-parsed library content, in that order.
///
/// `resolve` caches both hits and misses by lowercase name so repeated
/// lookups of the same name are idempotent (SPEC_FULL.md §8).
pub struct ModelRegistry {
    macros: HashMap<UniCase<ArcStr>, Arc<Macro>>,
    library_contents: Vec<(PathBuf, String)>,
    cache: RefCell<HashMap<UniCase<ArcStr>, Option<Definition>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            library_contents: Vec::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Registers a parsed macro under its lowercased name. A later call with
    /// the same name overwrites the earlier one; duplicate detection for
    /// link-error reporting happens one layer up, in the linker.
    pub fn register_macro(&mut self, macro_: Arc<Macro>) {
        self.macros
            .entry(UniCase::new(macro_.name.clone()))
            .or_insert(macro_);
    }

    /// Registers the raw byte content of a library file or library section
    /// for lazy, on-demand model resolution.
    pub fn register_library_content(&mut self, path: PathBuf, content: String) {
        self.library_contents.push((path, content));
    }

    /// Resolves `name` against static primitives, then parsed macros, then
    /// library content, caching the (possibly negative) result.
    pub fn resolve(&self, name: &str) -> Option<Definition> {
        let key = UniCase::new(ArcStr::from(name));
        if let Some(cached) = self.cache.borrow().get(&key) {
            return cached.clone();
        }

        let result = STATIC_PRIMITIVES
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .copied()
            .map(Definition::Primitive)
            .or_else(|| self.macros.get(&key).cloned().map(Definition::Macro))
            .or_else(|| {
                self.library_contents
                    .iter()
                    .find_map(|(_, content)| resolve_from_library_content(name, content))
            });

        self.cache.borrow_mut().insert(key, result.clone());
        result
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Port;

    #[test]
    fn resolves_static_primitive_case_insensitively() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.resolve("RESISTOR"),
            Some(Definition::Primitive(PrimitiveKind::Resistor))
        ));
    }

    #[test]
    fn resolves_registered_macro() {
        let mut registry = ModelRegistry::new();
        registry.register_macro(Arc::new(Macro::new("inv", vec![Port::new("a"), Port::new("y")])));
        match registry.resolve("INV") {
            Some(Definition::Macro(m)) => assert_eq!(m.name.as_str(), "inv"),
            _ => panic!("expected macro"),
        }
    }

    #[test]
    fn resolves_from_library_content_as_fallback() {
        let mut registry = ModelRegistry::new();
        registry.register_library_content(PathBuf::from("corners.lib"), ".model nch nmos\n".to_string());
        assert!(matches!(
            registry.resolve("nch"),
            Some(Definition::Primitive(PrimitiveKind::Nmos))
        ));
    }

    #[test]
    fn caches_negative_resolution() {
        let registry = ModelRegistry::new();
        assert!(registry.resolve("nonexistent").is_none());
        assert!(registry.resolve("nonexistent").is_none());
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut registry = ModelRegistry::new();
        registry.register_macro(Arc::new(Macro::new("inv", vec![])));
        let a = registry.resolve("inv");
        let b = registry.resolve("inv");
        match (a, b) {
            (Some(Definition::Macro(m1)), Some(Definition::Macro(m2))) => assert!(Arc::ptr_eq(&m1, &m2)),
            _ => panic!("expected macro both times"),
        }
    }
}
