//! Configuration values that may be resolved lazily.
//!
//! A [`DynamicField`] holds either a literal or the source text of a path or
//! expression. Composite fields resolve to a factory that [`DynamicField::instance`]
//! calls with the stored constructor arguments.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Runtime;
use crate::errors::{EvalError, Result};
use crate::value::{Mapping, Value};

fn default_strict() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicField {
    #[serde(alias = "default")]
    pub value: Value,
    /// Treat `value` as source text to resolve rather than as a literal.
    #[serde(default)]
    pub eval: bool,
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default)]
    pub nullable: bool,
    /// The resolved value is a factory to be called by [`DynamicField::instance`].
    #[serde(default)]
    pub composite: bool,
    #[serde(default)]
    pub constructor_arguments: Mapping,
    #[serde(default)]
    pub context: Option<Mapping>,
}

/// A literal field.
pub fn field(default: impl Into<Value>) -> DynamicField {
    DynamicField {
        value: default.into(),
        eval: false,
        strict: true,
        nullable: false,
        composite: false,
        constructor_arguments: Mapping::new(),
        context: None,
    }
}

/// A field naming a factory, built with `constructor_arguments` on demand.
/// `None` leaves the field empty, which only a nullable field accepts.
pub fn composite(source: Option<&str>) -> DynamicField {
    DynamicField {
        eval: true,
        composite: true,
        ..field(source.map(Value::from).unwrap_or_default())
    }
}

impl DynamicField {
    pub fn evaluated(mut self) -> Self {
        self.eval = true;
        self
    }

    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_context(mut self, context: Mapping) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constructor_arguments.insert(name.into(), value.into());
        self
    }

    /// Resolves against the default runtime.
    pub fn value(&self) -> Result<Value> {
        self.resolve(Runtime::global())
    }

    pub fn resolve(&self, runtime: &Runtime) -> Result<Value> {
        if !self.eval {
            return Ok(self.value.clone());
        }
        let source = match &self.value {
            Value::None if self.nullable => return Ok(Value::None),
            Value::None => {
                return Err(EvalError::runtime(
                    "TypeError: field is not nullable but holds None",
                ))
            }
            Value::Str(source) => source,
            other => {
                return Err(EvalError::runtime(format!(
                    "TypeError: an evaluated field needs source text, not {}",
                    other.type_name()
                )))
            }
        };
        let context = self.context.clone().map(Value::dict);
        match runtime.eval(source, context.as_ref(), false, None) {
            Err(e) if e.is_unresolved() && !self.strict => {
                debug!(source = source.as_str(), "lenient field left unresolved");
                Ok(Value::None)
            }
            other => other,
        }
    }

    /// Builds the composite against the default runtime.
    pub fn instance(&self) -> Result<Value> {
        self.instance_with(Runtime::global())
    }

    pub fn instance_with(&self, runtime: &Runtime) -> Result<Value> {
        if !self.composite {
            return Err(EvalError::runtime(
                "TypeError: cannot get an instance of a non-composite field",
            ));
        }
        let factory = self.resolve(runtime)?;
        if factory.is_none() && self.nullable {
            return Ok(Value::None);
        }
        let kwargs = self.constructor_arguments.clone().into_iter().collect();
        factory.call(Vec::new(), kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn runtime() -> Runtime {
        Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()))
    }

    #[test]
    fn literal_fields_are_returned_as_is() {
        let f = field("math.pi");
        assert_eq!(f.resolve(&runtime()).unwrap(), Value::from("math.pi"));
    }

    #[test]
    fn evaluated_fields() {
        let rt = runtime();
        let pi = field("math.pi").evaluated().resolve(&rt).unwrap();
        assert_eq!(pi, Value::Float(std::f64::consts::PI));
        let missing = field("nowhere.to_be.found").evaluated();
        assert!(missing.resolve(&rt).unwrap_err().is_unresolved());
        assert_eq!(missing.lenient().resolve(&rt).unwrap(), Value::None);
    }

    #[test]
    fn composite_calls_factory_with_arguments() {
        let rt = runtime();
        let context = Mapping::from([(
            "make".to_string(),
            rt.eval_function("lambda size=1, **kw: size * 10", None, None, false)
                .unwrap(),
        )]);
        let f = composite(Some("make")).with_context(context).with_argument("size", 4);
        assert_eq!(f.instance_with(&rt).unwrap(), Value::Int(40));
    }

    #[test]
    fn nullable_composites() {
        let rt = runtime();
        assert_eq!(composite(None).nullable().instance_with(&rt).unwrap(), Value::None);
        assert!(composite(None).instance_with(&rt).is_err());
        assert!(field(1).instance_with(&rt).is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let f: DynamicField = serde_json::from_value(json!({
            "value": "math.floor",
            "eval": true,
            "composite": false
        }))
        .unwrap();
        assert!(f.strict);
        assert!(f.eval);
        assert!(f.resolve(&runtime()).unwrap().is_callable());
    }
}
