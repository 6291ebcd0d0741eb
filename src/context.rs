//! Process-wide registry of named scopes.
//!
//! Registered scopes are the default lookup base when no explicit scope is
//! given, and every code fragment sees them as globals.

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{EvalError, Result};
use crate::value::{Mapping, Value};

lazy_static! {
    static ref REGISTRY: ContextRegistry = ContextRegistry::new();
}

#[derive(Default)]
pub struct ContextRegistry {
    entries: RwLock<Mapping>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by the free functions.
    pub fn global() -> &'static ContextRegistry {
        &REGISTRY
    }

    /// Stores `scope` under `name`, or under the scope's own name when `name`
    /// is `None`. An existing entry is replaced.
    pub fn register(&self, scope: Value, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => name.to_string(),
            None => scope.scope_name().ok_or_else(|| {
                EvalError::InvalidContext(format!(
                    "a {} has no name of its own; pass one explicitly",
                    scope.type_name()
                ))
            })?,
        };
        let replaced = self.entries.write().insert(name.clone(), scope).is_some();
        debug!(name = name.as_str(), replaced, "registered context");
        Ok(name)
    }

    pub fn unregister(&self, name: &str) -> Option<Value> {
        let removed = self.entries.write().remove(name);
        if removed.is_some() {
            debug!(name, "unregistered context");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.entries.read().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Copy of every name → scope entry.
    pub fn resolve_all(&self) -> Mapping {
        self.entries.read().clone()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

pub fn register(scope: Value, name: Option<&str>) -> Result<String> {
    REGISTRY.register(scope, name)
}

pub fn unregister(name: &str) -> Option<Value> {
    REGISTRY.unregister(name)
}

pub fn lookup(name: &str) -> Option<Value> {
    REGISTRY.lookup(name)
}

pub fn resolve_all() -> Mapping {
    REGISTRY.resolve_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;
    use pretty_assertions::assert_eq;

    #[test]
    fn explicit_and_derived_names() {
        let registry = ContextRegistry::new();
        registry
            .register(Object::new().with("x", 1).into_value(), Some("explicit"))
            .unwrap();
        let derived = registry
            .register(Object::named("settings").into_value(), None)
            .unwrap();
        assert_eq!(derived, "settings");
        assert!(registry.is_registered("explicit"));
        assert!(registry.is_registered("settings"));
    }

    #[test]
    fn unnamed_scope_needs_a_name() {
        let registry = ContextRegistry::new();
        let err = registry.register(Value::dict(Mapping::new()), None).unwrap_err();
        assert!(matches!(err, EvalError::InvalidContext(_)));
    }

    #[test]
    fn reregistration_overwrites_and_snapshot_is_a_copy() {
        let registry = ContextRegistry::new();
        registry.register(Value::Int(1), Some("n")).unwrap();
        let snapshot = registry.resolve_all();
        registry.register(Value::Int(2), Some("n")).unwrap();
        assert_eq!(snapshot.get("n"), Some(&Value::Int(1)));
        assert_eq!(registry.lookup("n"), Some(Value::Int(2)));
        assert_eq!(registry.unregister("n"), Some(Value::Int(2)));
        assert_eq!(registry.unregister("n"), None);
        registry.register(Value::Int(3), Some("m")).unwrap();
        registry.clear();
        assert!(registry.resolve_all().is_empty());
    }
}
