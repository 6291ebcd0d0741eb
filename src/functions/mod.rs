use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::errors::{EvalError, Result};
use crate::value::{Mapping, Value};

pub mod math;
pub mod methods;
pub mod wrapper;

pub use wrapper::{dynamic_args_wrapper, DynamicArgs};

pub type Kwargs = Vec<(String, Value)>;

/// Anything that can be called from a code fragment or by the host.
///
/// Rust cannot inspect a closure's parameter names at run time, so every
/// callable declares its [`Signature`] up front.
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> &Signature;
    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value>;
}

#[derive(Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Declared parameters of a callable.
#[derive(Clone, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub var_args: Option<String>,
    pub var_kwargs: Option<String>,
}

/// Arguments matched against a [`Signature`].
pub struct BoundArgs {
    /// One value per declared parameter, defaults filled in.
    pub values: Vec<Value>,
    /// Surplus positional arguments (`*args`).
    pub rest: Vec<Value>,
    /// Surplus keyword arguments (`**kwargs`).
    pub extra: Mapping,
}

impl BoundArgs {
    pub fn arg(&self, i: usize) -> Value {
        self.values.get(i).cloned().unwrap_or_default()
    }
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(names: &[&str]) -> Self {
        names.iter().fold(Self::new(), |sig, name| sig.param(name))
    }

    pub fn param(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn param_with_default(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: Some(default.into()),
        });
        self
    }

    pub fn with_var_args(mut self, name: &str) -> Self {
        self.var_args = Some(name.to_string());
        self
    }

    pub fn with_var_kwargs(mut self, name: &str) -> Self {
        self.var_kwargs = Some(name.to_string());
        self
    }

    /// Whether a keyword argument named `name` would be accepted.
    pub fn accepts_keyword(&self, name: &str) -> bool {
        self.var_kwargs.is_some() || self.params.iter().any(|p| p.name == name)
    }

    pub fn bind(&self, fname: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<BoundArgs> {
        if args.len() > self.params.len() && self.var_args.is_none() {
            return Err(EvalError::runtime(format!(
                "TypeError: {fname}() takes {} positional argument{} but {} were given",
                self.params.len(),
                if self.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut rest = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            match slots.get_mut(i) {
                Some(slot) => *slot = Some(arg),
                None => rest.push(arg),
            }
        }

        let mut extra = Mapping::new();
        for (name, value) in kwargs {
            match self.params.iter().position(|p| p.name == name) {
                Some(i) if slots[i].is_some() => {
                    return Err(EvalError::runtime(format!(
                        "TypeError: {fname}() got multiple values for argument '{name}'"
                    )))
                }
                Some(i) => slots[i] = Some(value),
                None if self.var_kwargs.is_some() => {
                    extra.insert(name, value);
                }
                None => {
                    return Err(EvalError::runtime(format!(
                        "TypeError: {fname}() got an unexpected keyword argument '{name}'"
                    )))
                }
            }
        }

        let mut values = Vec::with_capacity(self.params.len());
        let mut missing = Vec::new();
        for (param, slot) in self.params.iter().zip(slots) {
            match slot.or_else(|| param.default.clone()) {
                Some(v) => values.push(v),
                None => missing.push(param.name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(EvalError::runtime(format!(
                "TypeError: {fname}() missing required argument{}: {}",
                if missing.len() == 1 { "" } else { "s" },
                missing.iter().map(|m| format!("'{m}'")).join(", ")
            )));
        }

        Ok(BoundArgs {
            values,
            rest,
            extra,
        })
    }
}

type NativeFn = dyn Fn(&BoundArgs) -> Result<Value> + Send + Sync;

/// A Rust closure exposed as a callable, with an explicitly declared signature.
pub struct NativeFunction {
    name: String,
    signature: Signature,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(&BoundArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            func: Box::new(func),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Function(Arc::new(self))
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let bound = self.signature.bind(&self.name, args, kwargs)?;
        (self.func)(&bound)
    }
}

/// Names visible to every code fragment after its own scopes.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<String, Value>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for f in builtins::all() {
            registry.register_function(f);
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let map = Arc::make_mut(&mut self.inner);
        map.insert(name.into(), value.into());
    }

    pub fn register_function(&mut self, f: NativeFunction) {
        let name = f.name().to_string();
        self.register(name, f.into_value());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.keys().cloned().sorted().collect()
    }
}

pub mod builtins {
    use std::cmp::Ordering;

    use super::*;
    use crate::ast::BinOp;
    use crate::comparison::cmp_values;
    use crate::ops;

    fn type_error(msg: String) -> EvalError {
        EvalError::runtime(format!("TypeError: {msg}"))
    }

    fn overflow() -> EvalError {
        EvalError::runtime("OverflowError: integer result out of range")
    }

    fn items_of(fname: &str, v: &Value) -> Result<Vec<Value>> {
        v.iter_items().ok_or_else(|| {
            type_error(format!("{fname}() argument must be iterable, not '{}'", v.type_name()))
        })
    }

    fn extreme(fname: &'static str, want: Ordering) -> NativeFunction {
        NativeFunction::new(fname, Signature::new().with_var_args("args"), move |a| {
            let candidates = match a.rest.as_slice() {
                [single] => items_of(fname, single)?,
                many => many.to_vec(),
            };
            let mut best: Option<Value> = None;
            for item in candidates {
                best = Some(match best {
                    None => item,
                    Some(current) => match cmp_values(&item, &current) {
                        Some(ord) if ord == want => item,
                        Some(_) => current,
                        None => {
                            return Err(type_error(format!(
                                "'{}' not supported between '{}' and '{}'",
                                if want == Ordering::Less { "<" } else { ">" },
                                item.type_name(),
                                current.type_name()
                            )))
                        }
                    },
                });
            }
            best.ok_or_else(|| EvalError::runtime(format!("ValueError: {fname}() arg is an empty sequence")))
        })
    }

    fn sort_values(mut items: Vec<Value>) -> Result<Vec<Value>> {
        let mut failure = None;
        items.sort_by(|a, b| {
            cmp_values(a, b).unwrap_or_else(|| {
                failure.get_or_insert_with(|| {
                    type_error(format!(
                        "'<' not supported between instances of '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    ))
                });
                Ordering::Equal
            })
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(items),
        }
    }

    pub fn all() -> Vec<NativeFunction> {
        vec![
            NativeFunction::new("len", Signature::positional(&["obj"]), |a| {
                let n = match &a.values[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.read().len(),
                    Value::Dict(ns) => ns.len(),
                    other => {
                        return Err(type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(n as i64))
            }),
            NativeFunction::new("abs", Signature::positional(&["x"]), |a| match &a.values[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => match v.as_int() {
                    Some(i) => i
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(overflow),
                    None => Err(type_error(format!("bad operand type for abs(): '{}'", v.type_name()))),
                },
            }),
            extreme("min", Ordering::Less),
            extreme("max", Ordering::Greater),
            NativeFunction::new(
                "sum",
                Signature::new().param("iterable").param_with_default("start", 0),
                |a| {
                    items_of("sum", &a.values[0])?
                        .iter()
                        .try_fold(a.arg(1), |acc, item| ops::binary(BinOp::Add, &acc, item))
                },
            ),
            NativeFunction::new(
                "range",
                Signature::new()
                    .param("start")
                    .param_with_default("stop", Value::None)
                    .param_with_default("step", 1),
                |a| {
                    let int = |v: &Value| {
                        v.as_int().ok_or_else(|| {
                            type_error(format!("'{}' object cannot be interpreted as an integer", v.type_name()))
                        })
                    };
                    let (start, stop) = match &a.values[1] {
                        Value::None => (0, int(&a.values[0])?),
                        stop => (int(&a.values[0])?, int(stop)?),
                    };
                    let step = int(&a.values[2])?;
                    if step == 0 {
                        return Err(EvalError::runtime("ValueError: range() arg 3 must not be zero"));
                    }
                    let span = if step > 0 {
                        i128::from(stop) - i128::from(start)
                    } else {
                        i128::from(start) - i128::from(stop)
                    };
                    let step_size = i128::from(step).abs();
                    let count = if span > 0 { (span + step_size - 1) / step_size } else { 0 };
                    if count > crate::ops::MAX_SEQUENCE_LEN as i128 {
                        return Err(crate::ops::memory_error());
                    }
                    let mut out = Vec::with_capacity(count as usize);
                    let mut next = Some(start);
                    while let Some(i) = next {
                        if out.len() as i128 >= count {
                            break;
                        }
                        out.push(Value::Int(i));
                        next = i.checked_add(step);
                    }
                    Ok(Value::list(out))
                },
            ),
            NativeFunction::new("str", Signature::new().param_with_default("object", ""), |a| {
                Ok(Value::Str(a.values[0].to_string()))
            }),
            NativeFunction::new("repr", Signature::positional(&["object"]), |a| {
                Ok(Value::Str(a.values[0].repr()))
            }),
            NativeFunction::new("int", Signature::new().param_with_default("x", 0), |a| {
                match &a.values[0] {
                    Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                    Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        EvalError::runtime(format!("ValueError: invalid literal for int(): {}", a.values[0].repr()))
                    }),
                    v => v
                        .as_int()
                        .map(Value::Int)
                        .ok_or_else(|| type_error(format!("int() argument must be a string or a number, not '{}'", v.type_name()))),
                }
            }),
            NativeFunction::new("float", Signature::new().param_with_default("x", 0.0), |a| {
                match &a.values[0] {
                    Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        EvalError::runtime(format!("ValueError: could not convert string to float: {}", a.values[0].repr()))
                    }),
                    v => v
                        .as_float()
                        .map(Value::Float)
                        .ok_or_else(|| type_error(format!("float() argument must be a string or a number, not '{}'", v.type_name()))),
                }
            }),
            NativeFunction::new("bool", Signature::new().param_with_default("x", false), |a| {
                Ok(Value::Bool(a.values[0].truthy()))
            }),
            NativeFunction::new(
                "list",
                Signature::new().param_with_default("iterable", Value::list(Vec::new())),
                |a| Ok(Value::list(items_of("list", &a.values[0])?)),
            ),
            NativeFunction::new(
                "sorted",
                Signature::new().param("iterable").param_with_default("reverse", false),
                |a| {
                    let mut items = sort_values(items_of("sorted", &a.values[0])?)?;
                    if a.values[1].truthy() {
                        items.reverse();
                    }
                    Ok(Value::list(items))
                },
            ),
            NativeFunction::new(
                "round",
                Signature::new().param("number").param_with_default("ndigits", Value::None),
                |a| {
                    let x = a.values[0].as_float().ok_or_else(|| {
                        type_error(format!("type '{}' doesn't define __round__", a.values[0].type_name()))
                    })?;
                    match &a.values[1] {
                        Value::None if matches!(a.values[0], Value::Float(_)) => {
                            Ok(Value::Int(x.round_ties_even() as i64))
                        }
                        Value::None => Ok(a.values[0].clone()),
                        digits => {
                            let n = digits.as_int().ok_or_else(|| type_error("ndigits must be an integer".into()))?;
                            let scale = 10f64.powi(n.clamp(-300, 300) as i32);
                            Ok(Value::Float((x * scale).round_ties_even() / scale))
                        }
                    }
                },
            ),
            NativeFunction::new("callable", Signature::positional(&["object"]), |a| {
                Ok(Value::Bool(a.values[0].is_callable()))
            }),
            NativeFunction::new(
                "getattr",
                Signature::positional(&["object", "name"]).with_var_args("default"),
                |a| {
                    let name = a.values[1]
                        .as_str()
                        .ok_or_else(|| type_error("attribute name must be string".into()))?;
                    match a.values[0].child(name) {
                        Some(v) => Ok(v),
                        None => a.rest.first().cloned().ok_or_else(|| {
                            EvalError::runtime(format!(
                                "AttributeError: '{}' object has no attribute '{name}'",
                                a.values[0].type_name()
                            ))
                        }),
                    }
                },
            ),
            NativeFunction::new("hasattr", Signature::positional(&["object", "name"]), |a| {
                let name = a.values[1]
                    .as_str()
                    .ok_or_else(|| type_error("attribute name must be string".into()))?;
                Ok(Value::Bool(a.values[0].child(name).is_some()))
            }),
            NativeFunction::new("map", Signature::positional(&["function", "iterable"]), |a| {
                let out = items_of("map", &a.values[1])?
                    .into_iter()
                    .map(|item| a.values[0].call(vec![item], Vec::new()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(out))
            }),
            NativeFunction::new("filter", Signature::positional(&["function", "iterable"]), |a| {
                let mut out = Vec::new();
                for item in items_of("filter", &a.values[1])? {
                    let keep = match &a.values[0] {
                        Value::None => item.truthy(),
                        f => f.call(vec![item.clone()], Vec::new())?.truthy(),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }),
            NativeFunction::new("any", Signature::positional(&["iterable"]), |a| {
                Ok(Value::Bool(items_of("any", &a.values[0])?.iter().any(Value::truthy)))
            }),
            NativeFunction::new("all", Signature::positional(&["iterable"]), |a| {
                Ok(Value::Bool(items_of("all", &a.values[0])?.iter().all(Value::truthy)))
            }),
            NativeFunction::new(
                "enumerate",
                Signature::new().param("iterable").param_with_default("start", 0),
                |a| {
                    let start = a.values[1].as_int().unwrap_or(0);
                    let out = items_of("enumerate", &a.values[0])?
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let index = i64::try_from(i)
                                .ok()
                                .and_then(|i| start.checked_add(i))
                                .ok_or_else(overflow)?;
                            Ok(Value::list(vec![Value::Int(index), item]))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Value::list(out))
                },
            ),
            NativeFunction::new(
                "print",
                Signature::new().with_var_args("values").with_var_kwargs("options"),
                |a| {
                    let sep = a
                        .extra
                        .get("sep")
                        .and_then(Value::as_str)
                        .unwrap_or(" ")
                        .to_string();
                    println!("{}", a.rest.iter().join(&sep));
                    Ok(Value::None)
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(registry: &Registry, name: &str, args: Vec<Value>) -> Result<Value> {
        registry.get(name).expect("builtin").call(args, Vec::new())
    }

    #[test]
    fn bind_fills_defaults_and_collects_extras() {
        let sig = Signature::new()
            .param("a")
            .param_with_default("b", 2)
            .with_var_args("rest")
            .with_var_kwargs("extra");
        let bound = sig
            .bind(
                "f",
                vec![Value::Int(1), Value::Int(5), Value::Int(6)],
                vec![("z".into(), Value::Bool(true))],
            )
            .unwrap();
        assert_eq!(bound.values, vec![Value::Int(1), Value::Int(5)]);
        assert_eq!(bound.rest, vec![Value::Int(6)]);
        assert_eq!(bound.extra.get("z"), Some(&Value::Bool(true)));
    }

    #[test]
    fn bind_rejects_bad_calls() {
        let sig = Signature::positional(&["x"]);
        assert!(sig.bind("f", vec![], vec![]).is_err());
        assert!(sig.bind("f", vec![Value::Int(1), Value::Int(2)], vec![]).is_err());
        assert!(sig
            .bind("f", vec![Value::Int(1)], vec![("verbose".into(), Value::Bool(true))])
            .is_err());
        assert!(sig
            .bind("f", vec![Value::Int(1)], vec![("x".into(), Value::Int(2))])
            .is_err());
    }

    #[test]
    fn builtins() {
        let r = Registry::with_builtins();
        let xs = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call(&r, "len", vec![xs.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call(&r, "max", vec![xs.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call(&r, "min", vec![Value::Int(4), Value::Int(-1)]).unwrap(), Value::Int(-1));
        assert_eq!(call(&r, "sum", vec![xs.clone()]).unwrap(), Value::Int(6));
        assert_eq!(
            call(&r, "sorted", vec![xs]).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(call(&r, "int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call(&r, "round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(
            call(&r, "range", vec![Value::Int(3)]).unwrap(),
            Value::list(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn sorted_rejects_mixed_types() {
        let r = Registry::with_builtins();
        let mixed = Value::list(vec![Value::Int(1), Value::from("a")]);
        assert!(call(&r, "sorted", vec![mixed]).is_err());
    }

    #[test]
    fn registry_names_are_sorted() {
        let names = Registry::with_builtins().names();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
        assert!(names.contains(&"len".to_string()));
    }
}
