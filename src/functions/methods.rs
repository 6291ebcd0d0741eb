//! Methods on builtin types (`s.upper()`, `xs.append(x)`, `d.get(k)`).

use itertools::Itertools;

use crate::errors::{EvalError, Result};
use crate::functions::{BoundArgs, NativeFunction, Signature};
use crate::value::Value;

fn str_arg(a: &BoundArgs, i: usize, method: &str) -> Result<String> {
    match a.arg(i) {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::runtime(format!(
            "TypeError: {method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn optional_chars(a: &BoundArgs, method: &str) -> Result<Option<Vec<char>>> {
    match a.arg(0) {
        Value::None => Ok(None),
        _ => Ok(Some(str_arg(a, 0, method)?.chars().collect())),
    }
}

fn method(
    name: &str,
    signature: Signature,
    f: impl Fn(&BoundArgs) -> Result<Value> + Send + Sync + 'static,
) -> Value {
    NativeFunction::new(name, signature, f).into_value()
}

fn strip_method(s: String, which: &'static str) -> Value {
    method(which, Signature::new().param_with_default("chars", Value::None), move |a| {
        let chars = optional_chars(a, which)?;
        let is_stripped = |c: char| match &chars {
            Some(set) => set.contains(&c),
            None => c.is_whitespace(),
        };
        let out = match which {
            "lstrip" => s.trim_start_matches(is_stripped),
            "rstrip" => s.trim_end_matches(is_stripped),
            _ => s.trim_matches(is_stripped),
        };
        Ok(Value::Str(out.to_string()))
    })
}

fn str_method(s: String, name: &str) -> Option<Value> {
    let value = match name {
        "upper" => method(name, Signature::new(), move |_| Ok(Value::Str(s.to_uppercase()))),
        "lower" => method(name, Signature::new(), move |_| Ok(Value::Str(s.to_lowercase()))),
        "strip" => strip_method(s, "strip"),
        "lstrip" => strip_method(s, "lstrip"),
        "rstrip" => strip_method(s, "rstrip"),
        "split" => method(
            name,
            Signature::new().param_with_default("sep", Value::None),
            move |a| {
                let parts: Vec<Value> = match a.arg(0) {
                    Value::None => s.split_whitespace().map(Value::from).collect(),
                    _ => {
                        let sep = str_arg(a, 0, "split")?;
                        if sep.is_empty() {
                            return Err(EvalError::runtime("ValueError: empty separator"));
                        }
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                };
                Ok(Value::list(parts))
            },
        ),
        "join" => method(name, Signature::positional(&["iterable"]), move |a| {
            let items = a.arg(0).iter_items().ok_or_else(|| {
                EvalError::runtime("TypeError: can only join an iterable")
            })?;
            let parts = items
                .iter()
                .map(|item| match item {
                    Value::Str(p) => Ok(p.clone()),
                    other => Err(EvalError::runtime(format!(
                        "TypeError: sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Str(parts.iter().join(&s)))
        }),
        "startswith" => method(name, Signature::positional(&["prefix"]), move |a| {
            Ok(Value::Bool(s.starts_with(&str_arg(a, 0, "startswith")?)))
        }),
        "endswith" => method(name, Signature::positional(&["suffix"]), move |a| {
            Ok(Value::Bool(s.ends_with(&str_arg(a, 0, "endswith")?)))
        }),
        "replace" => method(name, Signature::positional(&["old", "new"]), move |a| {
            let (old, new) = (str_arg(a, 0, "replace")?, str_arg(a, 1, "replace")?);
            Ok(Value::Str(s.replace(&old, &new)))
        }),
        _ => return None,
    };
    Some(value)
}

fn list_method(list: &Value, name: &str) -> Option<Value> {
    let Value::List(items) = list else {
        return None;
    };
    let items = items.clone();
    let value = match name {
        "append" => method(name, Signature::positional(&["object"]), move |a| {
            items.write().push(a.arg(0));
            Ok(Value::None)
        }),
        "extend" => method(name, Signature::positional(&["iterable"]), move |a| {
            let more = a.arg(0).iter_items().ok_or_else(|| {
                EvalError::runtime("TypeError: extend() argument must be iterable")
            })?;
            items.write().extend(more);
            Ok(Value::None)
        }),
        "pop" => method(name, Signature::new().param_with_default("index", -1), move |a| {
            let mut items = items.write();
            let len = items.len() as i64;
            let index = a.arg(0).as_int().unwrap_or(-1);
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                return Err(EvalError::runtime("IndexError: pop index out of range"));
            }
            Ok(items.remove(index as usize))
        }),
        "index" => method(name, Signature::positional(&["value"]), move |a| {
            let needle = a.arg(0);
            items
                .read()
                .iter()
                .position(|x| *x == needle)
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| {
                    EvalError::runtime(format!("ValueError: {} is not in list", needle.repr()))
                })
        }),
        _ => return None,
    };
    Some(value)
}

fn dict_method(dict: &Value, name: &str) -> Option<Value> {
    let Value::Dict(ns) = dict else {
        return None;
    };
    let ns = ns.clone();
    let value = match name {
        "get" => method(
            name,
            Signature::new().param("key").param_with_default("default", Value::None),
            move |a| {
                let found = a.arg(0).as_str().and_then(|k| ns.get(k));
                Ok(found.unwrap_or_else(|| a.arg(1)))
            },
        ),
        "keys" => method(name, Signature::new(), move |_| {
            Ok(Value::list(ns.keys().into_iter().map(Value::Str).collect()))
        }),
        "values" => method(name, Signature::new(), move |_| {
            Ok(Value::list(ns.snapshot().into_values().collect()))
        }),
        "items" => method(name, Signature::new(), move |_| {
            let pairs = ns
                .snapshot()
                .into_iter()
                .map(|(k, v)| Value::list(vec![Value::Str(k), v]))
                .collect();
            Ok(Value::list(pairs))
        }),
        "update" => method(name, Signature::positional(&["other"]), move |a| {
            let other = a.arg(0);
            let entries = match &other {
                Value::Dict(o) => o.snapshot(),
                _ => {
                    return Err(EvalError::runtime(format!(
                        "TypeError: '{}' object is not a mapping",
                        other.type_name()
                    )))
                }
            };
            ns.extend(entries);
            Ok(Value::None)
        }),
        _ => return None,
    };
    Some(value)
}

/// The method `name` bound to `receiver`, if the receiver's type has one.
pub fn bound_method(receiver: &Value, name: &str) -> Option<Value> {
    match receiver {
        Value::Str(s) => str_method(s.clone(), name),
        Value::List(_) => list_method(receiver, name),
        Value::Dict(_) => dict_method(receiver, name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Mapping;
    use pretty_assertions::assert_eq;

    fn invoke(receiver: &Value, name: &str, args: Vec<Value>) -> Value {
        bound_method(receiver, name)
            .expect("method exists")
            .call(args, Vec::new())
            .unwrap()
    }

    #[test]
    fn string_methods() {
        let s = Value::from("  a,b  ");
        assert_eq!(invoke(&s, "strip", vec![]), Value::from("a,b"));
        assert_eq!(invoke(&Value::from("xxhixx"), "strip", vec![Value::from("x")]), Value::from("hi"));
        assert_eq!(
            invoke(&Value::from("a,b"), "split", vec![Value::from(",")]),
            Value::list(vec![Value::from("a"), Value::from("b")])
        );
        let parts = Value::list(vec![Value::from("x"), Value::from("y")]);
        assert_eq!(invoke(&Value::from("-"), "join", vec![parts]), Value::from("x-y"));
    }

    #[test]
    fn list_methods_mutate_in_place() {
        let xs = Value::list(vec![Value::Int(1)]);
        invoke(&xs, "append", vec![Value::Int(2)]);
        assert_eq!(xs, Value::list(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(invoke(&xs, "pop", vec![]), Value::Int(2));
        assert_eq!(invoke(&xs, "index", vec![Value::Int(1)]), Value::Int(0));
    }

    #[test]
    fn dict_methods() {
        let d = Value::dict(Mapping::from([("a".to_string(), Value::Int(1))]));
        assert_eq!(invoke(&d, "get", vec![Value::from("a")]), Value::Int(1));
        assert_eq!(invoke(&d, "get", vec![Value::from("z"), Value::Int(0)]), Value::Int(0));
        assert_eq!(invoke(&d, "keys", vec![]), Value::list(vec![Value::from("a")]));
    }

    #[test]
    fn unknown_methods() {
        assert!(bound_method(&Value::from("s"), "nope").is_none());
        assert!(bound_method(&Value::Int(1), "upper").is_none());
    }
}
