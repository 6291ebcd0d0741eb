//! Runtime values and the scopes they can be resolved through.
//!
//! Every value that can hold named children answers the same two questions,
//! "give me child X" and "set child X to V", through [`Value::child`] and
//! [`Value::set_child`]. Mappings answer with keys, objects with attributes
//! (via the [`Scope`] trait) and modules with their top-level bindings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{EvalError, Result};
use crate::functions::Callable;

pub type Mapping = BTreeMap<String, Value>;

/// Shared name → value table. Clones share storage.
#[derive(Clone, Default)]
pub struct Namespace {
    inner: Arc<RwLock<Mapping>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(entries: Mapping) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> Mapping {
        self.inner.read().clone()
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.inner.write().extend(entries);
    }

    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Mapping> for Namespace {
    fn from(entries: Mapping) -> Self {
        Namespace::from_mapping(entries)
    }
}

/// Attribute access for host objects.
///
/// Implement this to expose a Rust type to dotted paths and code fragments.
pub trait Scope: Send + Sync {
    /// Name used when the object is registered as a context without an explicit one.
    fn name(&self) -> Option<&str> {
        None
    }

    fn get_attr(&self, name: &str) -> Option<Value>;

    fn set_attr(&self, name: &str, _value: Value) -> Result<()> {
        Err(EvalError::assignment(
            name,
            "object does not support attribute assignment",
        ))
    }

    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A plain attribute bag.
#[derive(Clone, Default)]
pub struct Object {
    name: Option<String>,
    attrs: Namespace,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            attrs: Namespace::new(),
        }
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.set(key, value.into());
        self
    }

    pub fn attrs(&self) -> &Namespace {
        &self.attrs
    }

    pub fn into_value(self) -> Value {
        Value::Object(Arc::new(self))
    }
}

impl Scope for Object {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.attrs.set(name, value);
        Ok(())
    }

    fn attr_names(&self) -> Vec<String> {
        self.attrs.keys()
    }
}

/// A loaded module: either a source file, a package directory, or a native module.
pub struct Module {
    name: String,
    path: Option<PathBuf>,
    package_dir: Option<PathBuf>,
    namespace: Namespace,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("package_dir", &self.package_dir)
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn native(name: impl Into<String>, namespace: Namespace) -> Self {
        let name = name.into();
        namespace.set("__name__", Value::Str(name.clone()));
        Self {
            name,
            path: None,
            package_dir: None,
            namespace,
        }
    }

    pub fn from_file(name: impl Into<String>, path: PathBuf, package_dir: Option<PathBuf>) -> Self {
        let module = Module::native(name, Namespace::new());
        module
            .namespace
            .set("__file__", Value::Str(path.display().to_string()));
        Self {
            path: Some(path),
            package_dir,
            ..module
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn package_dir(&self) -> Option<&Path> {
        self.package_dir.as_deref()
    }

    pub fn is_package(&self) -> bool {
        self.package_dir.is_some()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl Scope for Module {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.namespace.get(name)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.namespace.set(name, value);
        Ok(())
    }

    fn attr_names(&self) -> Vec<String> {
        self.namespace.keys()
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<RwLock<Vec<Value>>>),
    Dict(Namespace),
    Object(Arc<dyn Scope>),
    Module(Arc<Module>),
    Function(Arc<dyn Callable>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn dict(entries: Mapping) -> Self {
        Value::Dict(Namespace::from_mapping(entries))
    }

    pub fn object(scope: impl Scope + 'static) -> Self {
        Value::Object(Arc::new(scope))
    }

    pub fn function(f: impl Callable + 'static) -> Self {
        Value::Function(Arc::new(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
            Value::Module(_) => "module",
            Value::Function(_) => "function",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.read().is_empty(),
            Value::Dict(ns) => !ns.is_empty(),
            Value::Object(_) | Value::Module(_) | Value::Function(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers, with booleans counting as 0/1.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<Arc<dyn Callable>> {
        match self {
            Value::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Elements of a list, characters of a string, or keys of a mapping.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.read().clone()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Dict(ns) => Some(ns.keys().into_iter().map(Value::Str).collect()),
            _ => None,
        }
    }

    /// Child by name: mapping key, object attribute, module binding, or list index.
    pub fn child(&self, name: &str) -> Option<Value> {
        match self {
            Value::Dict(ns) => ns.get(name),
            Value::Object(scope) => scope.get_attr(name),
            Value::Module(module) => module.namespace().get(name),
            Value::List(items) => {
                let index: usize = name.parse().ok()?;
                items.read().get(index).cloned()
            }
            _ => None,
        }
    }

    pub fn set_child(&self, name: &str, value: Value) -> Result<()> {
        match self {
            Value::Dict(ns) => {
                ns.set(name, value);
                Ok(())
            }
            Value::Object(scope) => scope.set_attr(name, value),
            Value::Module(module) => {
                module.namespace().set(name, value);
                Ok(())
            }
            Value::List(items) => {
                let mut items = items.write();
                let len = items.len();
                let slot = name
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| {
                        EvalError::assignment(name, format!("list index out of range (len {len})"))
                    })?;
                *slot = value;
                Ok(())
            }
            other => Err(EvalError::assignment(
                name,
                format!("'{}' object does not support item or attribute assignment", other.type_name()),
            )),
        }
    }

    /// Name → value entries when this value can serve as a lookup scope.
    pub fn entries(&self) -> Option<Mapping> {
        match self {
            Value::Dict(ns) => Some(ns.snapshot()),
            Value::Module(module) => Some(module.namespace().snapshot()),
            Value::Object(scope) => Some(
                scope
                    .attr_names()
                    .into_iter()
                    .filter_map(|k| scope.get_attr(&k).map(|v| (k, v)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// The name a scope carries on its own, used when registering without an explicit one.
    pub fn scope_name(&self) -> Option<String> {
        match self {
            Value::Module(module) => Some(module.name().to_string()),
            Value::Object(scope) => scope.name().map(str::to_string),
            Value::Function(f) => Some(f.name().to_string()),
            _ => None,
        }
    }

    pub fn call(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value> {
        match self {
            Value::Function(f) => f.call(args, kwargs),
            other => Err(EvalError::runtime(format!(
                "TypeError: '{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Source-like rendering, strings quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[{}]", items.read().iter().map(Value::repr).join(", "))
            }
            Value::Dict(ns) => write!(
                f,
                "{{{}}}",
                ns.snapshot()
                    .iter()
                    .map(|(k, v)| format!("'{k}': {}", v.repr()))
                    .join(", ")
            ),
            Value::Object(scope) => match scope.name() {
                Some(name) => write!(f, "<object {name}>"),
                None => write!(f, "<object>"),
            },
            Value::Module(module) => write!(f, "<module '{}'>", module.name()),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b) || a.snapshot() == b.snapshot(),
            (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::Float(_), _) | (_, Value::Float(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Mapping> for Value {
    fn from(entries: Mapping) -> Self {
        Value::dict(entries)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Dict(ns)
    }
}

impl From<Arc<dyn Callable>> for Value {
    fn from(f: Arc<dyn Callable>) -> Self {
        Value::Function(f)
    }
}

impl From<Arc<Module>> for Value {
    fn from(m: Arc<Module>) -> Self {
        Value::Module(m)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::dict(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let items = items.read();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(_) | Value::Object(_) => {
                let entries = self.entries().unwrap_or_default();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in &entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Module(_) | Value::Function(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
