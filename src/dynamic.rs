//! Objects whose methods are written as code and supplied at construction.
//!
//! A [`MethodTable`] declares which method names are dynamic. Creating an
//! object from it takes the implementations as keyword-style entries: either
//! prefixed (`__dy__name`) or, for blended methods, under the bare name.
//! Each implementation is a descriptor handed to [`Runtime::eval_function`],
//! and the resulting callable receives the object as its first argument.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Descriptor, Runtime};
use crate::errors::{EvalError, Result};
use crate::functions::{Callable, Kwargs, NativeFunction, Signature};
use crate::value::{Mapping, Namespace, Scope, Value};

/// Marks a constructor entry as a method implementation.
pub const IMPLEMENTATION_PREFIX: &str = "__dy__";

#[derive(Clone, Default)]
pub struct MethodTable {
    name: Option<String>,
    blend: bool,
    /// Method name → its own blend setting, `None` when it follows the table.
    methods: BTreeMap<String, Option<bool>>,
}

impl MethodTable {
    /// An empty table. `blend` decides whether methods may be implemented
    /// under their bare name, unless a method says otherwise.
    pub fn new(blend: bool) -> Self {
        Self {
            blend,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.insert(name.into(), None);
        self
    }

    pub fn method_with_blend(mut self, name: impl Into<String>, blend: bool) -> Self {
        self.methods.insert(name.into(), Some(blend));
        self
    }

    /// Adds the parent's methods that this table does not redeclare.
    /// Inherited methods keep the blend setting they had in the parent.
    pub fn inherit(mut self, parent: &MethodTable) -> Self {
        for name in parent.names() {
            self.methods
                .entry(name.to_string())
                .or_insert(Some(parent.is_blended(name)));
        }
        self
    }

    pub fn is_dynamic(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn is_blended(&self, name: &str) -> bool {
        match self.methods.get(name) {
            Some(own) => own.unwrap_or(self.blend),
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    fn class_name(&self) -> &str {
        self.name.as_deref().unwrap_or("object")
    }

    /// Maps a constructor key onto the method it implements, if any.
    fn method_for<'k>(&self, key: &'k str) -> Option<&'k str> {
        match key.strip_prefix(IMPLEMENTATION_PREFIX) {
            Some(name) => self.is_dynamic(name).then_some(name),
            None => self.is_blended(key).then_some(key),
        }
    }

    /// Builds an object. Entries of `arguments` that name a method become its
    /// implementation, evaluated against `context`; the rest become attributes.
    pub fn instantiate(
        &self,
        runtime: &Runtime,
        arguments: Mapping,
        context: Option<&Value>,
    ) -> Result<DynamicObject> {
        let object = DynamicObject::new(self.clone());
        let mut implementations = Vec::new();
        for (key, value) in arguments {
            match self.method_for(&key) {
                Some(name) => implementations.push((name.to_string(), value)),
                None => object.inner.attrs.set(key, value),
            }
        }
        for (name, descriptor) in implementations {
            object.implement(runtime, &name, descriptor, context, None, false)?;
        }
        Ok(object)
    }
}

struct Inner {
    table: MethodTable,
    attrs: Namespace,
    implemented: Namespace,
}

/// An instance built from a [`MethodTable`]. Clones share state.
#[derive(Clone)]
pub struct DynamicObject {
    inner: Arc<Inner>,
}

impl DynamicObject {
    pub fn new(table: MethodTable) -> Self {
        Self {
            inner: Arc::new(Inner {
                table,
                attrs: Namespace::new(),
                implemented: Namespace::new(),
            }),
        }
    }

    pub fn table(&self) -> &MethodTable {
        &self.inner.table
    }

    pub fn is_implemented(&self, method: &str) -> bool {
        self.inner.implemented.contains(method)
    }

    /// Evaluates `descriptor` and installs the result as `method`.
    pub fn implement(
        &self,
        runtime: &Runtime,
        method: &str,
        descriptor: impl TryInto<Descriptor, Error = EvalError>,
        context: Option<&Value>,
        target_name: Option<&str>,
        dynamic_args: bool,
    ) -> Result<()> {
        let table = &self.inner.table;
        if !table.is_dynamic(method) {
            return Err(EvalError::runtime(format!(
                "AttributeError: {method} is not a dynamic method of {}",
                table.class_name()
            )));
        }
        let value = runtime.eval_function(descriptor.try_into()?, context, target_name, dynamic_args)?;
        if !value.is_callable() {
            return Err(EvalError::runtime(format!(
                "TypeError: implementation of {method} is a {}, not a function",
                value.type_name()
            )));
        }
        debug!(class = table.class_name(), method, "implemented dynamic method");
        self.inner.implemented.set(method, value);
        Ok(())
    }

    /// Implements several methods at once, each from its own descriptor.
    pub fn implement_all(&self, runtime: &Runtime, implementations: Mapping) -> Result<()> {
        for (method, descriptor) in implementations {
            self.implement(runtime, &method, descriptor, None, None, false)?;
        }
        Ok(())
    }

    pub fn into_value(self) -> Value {
        Value::object(self)
    }

    fn unimplemented(&self, method: &str) -> Value {
        let message = format!(
            "NotImplementedError: {}.{method} has not been implemented",
            self.inner.table.class_name()
        );
        NativeFunction::new(
            method,
            Signature::new().with_var_args("args").with_var_kwargs("kwargs"),
            move |_| Err(EvalError::runtime(message.clone())),
        )
        .into_value()
    }
}

impl Scope for DynamicObject {
    fn name(&self) -> Option<&str> {
        self.inner.table.name.as_deref()
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        if let Some(func) = self.inner.implemented.get(name).and_then(|v| v.as_callable()) {
            return Some(Value::function(BoundMethod::new(self.clone().into_value(), func)));
        }
        if let Some(value) = self.inner.attrs.get(name) {
            return Some(value);
        }
        self.inner
            .table
            .is_dynamic(name)
            .then(|| self.unimplemented(name))
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.inner.attrs.set(name, value);
        Ok(())
    }

    fn attr_names(&self) -> Vec<String> {
        self.inner.attrs.keys()
    }
}

/// A callable with its first argument fixed to the receiving object.
pub struct BoundMethod {
    receiver: Value,
    func: Arc<dyn Callable>,
    signature: Signature,
}

impl BoundMethod {
    pub fn new(receiver: Value, func: Arc<dyn Callable>) -> Self {
        let mut signature = func.signature().clone();
        if !signature.params.is_empty() {
            signature.params.remove(0);
        }
        Self {
            receiver,
            func,
            signature,
        }
    }
}

impl Callable for BoundMethod {
    fn name(&self) -> &str {
        self.func.name()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mut args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        args.insert(0, self.receiver.clone());
        self.func.call(args, kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderOptions;
    use pretty_assertions::assert_eq;

    fn runtime() -> Runtime {
        Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()))
    }

    fn code(source: &str) -> Value {
        Value::from(source)
    }

    #[test]
    fn prefixed_and_blended_entries_become_methods() {
        let table = MethodTable::new(false)
            .named("Model")
            .method("forward")
            .method_with_blend("score", true);
        let args = Mapping::from([
            ("__dy__forward".to_string(), code("lambda self, x: x * self.scale")),
            ("score".to_string(), code("lambda self: self.scale + 1")),
            ("scale".to_string(), Value::Int(3)),
        ]);
        let object = table.instantiate(&runtime(), args, None).unwrap().into_value();

        let forward = object.child("forward").unwrap();
        assert_eq!(forward.call(vec![Value::Int(2)], vec![]).unwrap(), Value::Int(6));
        let score = object.child("score").unwrap();
        assert_eq!(score.call(vec![], vec![]).unwrap(), Value::Int(4));
    }

    #[test]
    fn unblended_bare_name_is_an_attribute() {
        let table = MethodTable::new(false).method("forward");
        let args = Mapping::from([("forward".to_string(), Value::Int(1))]);
        let object = table.instantiate(&runtime(), args, None).unwrap();
        assert_eq!(object.get_attr("forward"), Some(Value::Int(1)));
        assert!(!object.is_implemented("forward"));
    }

    #[test]
    fn later_implementation_replaces_earlier_one() {
        let rt = runtime();
        let object = DynamicObject::new(MethodTable::new(true).method("run"));
        object.implement(&rt, "run", code("lambda self: 1"), None, None, false).unwrap();
        object
            .implement_all(&rt, Mapping::from([("run".to_string(), code("lambda self: 2"))]))
            .unwrap();
        let run = object.get_attr("run").unwrap();
        assert_eq!(run.call(vec![], vec![]).unwrap(), Value::Int(2));
    }

    #[test]
    fn implement_rejects_undeclared_and_non_callable() {
        let rt = runtime();
        let object = DynamicObject::new(MethodTable::new(true).named("Thing").method("act"));
        let err = object
            .implement(&rt, "other", code("lambda self: 1"), None, None, false)
            .unwrap_err();
        assert!(err.to_string().contains("not a dynamic method of Thing"));
        let err = object.implement(&rt, "act", code("1 + 1"), None, None, false).unwrap_err();
        assert!(err.to_string().contains("TypeError"));
    }

    #[test]
    fn unimplemented_method_raises_when_called() {
        let object = DynamicObject::new(MethodTable::new(true).named("Thing").method("act")).into_value();
        let err = object.child("act").unwrap().call(vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("NotImplementedError: Thing.act"));
    }

    #[test]
    fn block_implementation_with_target_and_context() {
        let rt = runtime();
        let object = DynamicObject::new(MethodTable::new(true).method("greet"));
        let context = Value::from(serde_json::json!({"greeting": "hi"}));
        object
            .implement(
                &rt,
                "greet",
                code("def greet(self, who):\n    return greeting + ' ' + who\n"),
                Some(&context),
                Some("greet"),
                true,
            )
            .unwrap();
        let greet = object.get_attr("greet").unwrap();
        let out = greet
            .call(vec![Value::from("bob")], vec![("loud".to_string(), Value::Bool(true))])
            .unwrap();
        assert_eq!(out, Value::from("hi bob"));
    }

    #[test]
    fn inherited_methods_keep_parent_blend() {
        let parent = MethodTable::new(false).method("a").method_with_blend("b", true);
        let child = MethodTable::new(true).method("c").inherit(&parent);
        assert!(child.is_dynamic("a") && !child.is_blended("a"));
        assert!(child.is_blended("b") && child.is_blended("c"));
    }
}
