//! Named strategies for `custom` mapping entries.
//!
//! Mapping documents refer to custom conversions by name only; the code
//! behind each name lives here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use geofuse_core_common::{FieldType, Value};

use crate::conversion::ConversionFailure;

/// A custom conversion strategy.
pub type CustomFn = Arc<dyn Fn(&Value) -> Result<Value, ConversionFailure> + Send + Sync>;

/// Registry of custom conversion strategies keyed by name.
#[derive(Clone)]
pub struct ConversionRegistry {
    strategies: BTreeMap<String, CustomFn>,
}

impl ConversionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in text strategies: `upper`, `lower`,
    /// `trim`, `to_string` and `null_if_empty`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("upper", |v| map_text(v, |s| s.to_uppercase()));
        registry.register("lower", |v| map_text(v, |s| s.to_lowercase()));
        registry.register("trim", |v| map_text(v, |s| s.trim().to_string()));
        registry.register("to_string", |v| {
            Ok(if v.is_null() {
                Value::Null
            } else {
                Value::String(v.to_string())
            })
        });
        registry.register("null_if_empty", |v| {
            Ok(match v.as_str() {
                Some(s) if s.trim().is_empty() => Value::Null,
                _ => v.clone(),
            })
        });
        registry
    }

    /// Registers (or replaces) a strategy.
    pub fn register<F>(&mut self, name: impl Into<String>, strategy: F)
    where
        F: Fn(&Value) -> Result<Value, ConversionFailure> + Send + Sync + 'static,
    {
        self.strategies.insert(name.into(), Arc::new(strategy));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CustomFn> {
        self.strategies.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Result<Value, ConversionFailure> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(f(s))),
        _ => Err(ConversionFailure::new(value, FieldType::String, "not text")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(registry: &ConversionRegistry, name: &str, value: Value) -> Result<Value, ConversionFailure> {
        registry.get(name).expect("registered")(&value)
    }

    #[test]
    fn builtins_transform_text() {
        let registry = ConversionRegistry::default();
        assert_eq!(run(&registry, "upper", "abc".into()), Ok(Value::from("ABC")));
        assert_eq!(run(&registry, "lower", "ABC".into()), Ok(Value::from("abc")));
        assert_eq!(run(&registry, "trim", "  x ".into()), Ok(Value::from("x")));
        assert_eq!(run(&registry, "to_string", Value::Int(5)), Ok(Value::from("5")));
        assert_eq!(run(&registry, "null_if_empty", " ".into()), Ok(Value::Null));
        assert_eq!(run(&registry, "null_if_empty", "a".into()), Ok(Value::from("a")));
        assert!(run(&registry, "upper", Value::Int(1)).is_err());
    }

    #[test]
    fn caller_strategies_can_be_registered() {
        let mut registry = ConversionRegistry::empty();
        assert!(!registry.contains("double"));
        registry.register("double", |v| match v {
            Value::Int(i) => Ok(Value::Int(i * 2)),
            other => Err(ConversionFailure::new(other, FieldType::Int, "not an integer")),
        });
        assert_eq!(run(&registry, "double", Value::Int(4)), Ok(Value::Int(8)));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double"]);
        assert_eq!(format!("{registry:?}"), "{\"double\"}");
    }
}
