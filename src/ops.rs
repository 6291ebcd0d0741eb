// src/ops.rs
//! Operators shared by the interpreter and the builtin functions.

use crate::ast::{BinOp, UnaryOp};
use crate::errors::{EvalError, Result};
use crate::value::Value;

pub fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> EvalError {
    EvalError::runtime(format!(
        "TypeError: unsupported operand type(s) for {}: '{}' and '{}'",
        symbol(op),
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> EvalError {
    EvalError::runtime("OverflowError: integer result out of range")
}

fn zero_division() -> EvalError {
    EvalError::runtime("ZeroDivisionError: division by zero")
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

/// Largest list or string (in elements or bytes) a snippet may build.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 24;

pub(crate) fn memory_error() -> EvalError {
    EvalError::runtime("MemoryError: sequence too large")
}

/// Checks that `len * times` stays within bounds, returning `times` as a count.
fn repeat_count(len: usize, times: i64) -> Result<usize> {
    let times = usize::try_from(times.max(0)).map_err(|_| overflow())?;
    let total = len
        .checked_mul(times)
        .ok_or_else(|| EvalError::runtime("OverflowError: repeated sequence is too long"))?;
    if total > MAX_SEQUENCE_LEN {
        return Err(memory_error());
    }
    Ok(times)
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>> {
    let times = repeat_count(items.len(), times)?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => return Ok(Value::Str(format!("{x}{y}"))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut out = x.read().clone();
            out.extend(y.read().iter().cloned());
            return Ok(Value::list(out));
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let times = repeat_count(s.len(), n.as_int().unwrap_or(0))?;
            return Ok(Value::Str(s.repeat(times)));
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items)) if n.as_int().is_some() => {
            let items = items.read().clone();
            return Ok(Value::list(repeat(&items, n.as_int().unwrap_or(0))?));
        }
        _ => {}
    }

    if !is_number(a) || !is_number(b) {
        return Err(unsupported(op, a, b));
    }

    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if !matches!(a, Value::Float(_)) && !matches!(b, Value::Float(_)) {
            return int_binary(op, x, y);
        }
    }

    let (x, y) = match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(unsupported(op, a, b)),
    };
    let out = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division());
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division());
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division());
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(Value::Float(out))
}

fn int_binary(op: BinOp, x: i64, y: i64) -> Result<Value> {
    let out = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division());
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division());
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division());
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(out))
}

pub fn unary(op: UnaryOp, v: &Value) -> Result<Value> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => {
            let i = v.as_int().unwrap_or(0);
            i.checked_neg().map(Value::Int).ok_or_else(overflow)
        }
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (op, v) => Err(EvalError::runtime(format!(
            "TypeError: bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items), item) => Ok(items.read().iter().any(|x| x == item)),
        (Value::Dict(ns), Value::Str(key)) => Ok(ns.contains(key)),
        (Value::Dict(_), _) => Ok(false),
        _ => Err(EvalError::runtime(format!(
            "TypeError: argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

fn normalize_index(index: &Value, len: usize) -> Result<Option<usize>> {
    let i = index.as_int().ok_or_else(|| {
        EvalError::runtime(format!(
            "TypeError: indices must be integers, not '{}'",
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    Ok((0..len).contains(&i).then_some(i as usize))
}

/// `container[index]`
pub fn get_index(container: &Value, index: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.read();
            normalize_index(index, items.len())?
                .map(|i| items[i].clone())
                .ok_or_else(|| EvalError::runtime("IndexError: list index out of range"))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(index, chars.len())?
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| EvalError::runtime("IndexError: string index out of range"))
        }
        Value::Dict(ns) => {
            let key = index.as_str().ok_or_else(|| {
                EvalError::runtime(format!("KeyError: {}", index.repr()))
            })?;
            ns.get(key)
                .ok_or_else(|| EvalError::runtime(format!("KeyError: {}", index.repr())))
        }
        other => Err(EvalError::runtime(format!(
            "TypeError: '{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value`
pub fn set_index(container: &Value, index: &Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let mut items = items.write();
            let len = items.len();
            let i = normalize_index(index, len)?
                .ok_or_else(|| EvalError::runtime("IndexError: list assignment index out of range"))?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(ns) => {
            let key = index.as_str().ok_or_else(|| {
                EvalError::runtime(format!(
                    "TypeError: dict keys must be str, not '{}'",
                    index.type_name()
                ))
            })?;
            ns.set(key, value);
            Ok(())
        }
        other => Err(EvalError::runtime(format!(
            "TypeError: '{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}
