//! The native `math` module.

use std::sync::Arc;

use crate::errors::{EvalError, Result};
use crate::functions::{BoundArgs, NativeFunction, Signature};
use crate::value::{Module, Namespace, Value};

pub const NAME: &str = "math";

fn number(a: &BoundArgs, i: usize) -> Result<f64> {
    let v = a.arg(i);
    v.as_float().ok_or_else(|| {
        EvalError::runtime(format!(
            "TypeError: must be real number, not {}",
            v.type_name()
        ))
    })
}

fn domain_checked(x: f64) -> Result<Value> {
    if x.is_nan() {
        return Err(EvalError::runtime("ValueError: math domain error"));
    }
    Ok(Value::Float(x))
}

fn unary(name: &'static str, f: fn(f64) -> f64) -> NativeFunction {
    NativeFunction::new(name, Signature::positional(&["x"]), move |a| {
        domain_checked(f(number(a, 0)?))
    })
}

fn to_int(name: &'static str, f: fn(f64) -> f64) -> NativeFunction {
    NativeFunction::new(name, Signature::positional(&["x"]), move |a| {
        if let Value::Int(i) = a.arg(0) {
            return Ok(Value::Int(i));
        }
        let x = f(number(a, 0)?);
        if !x.is_finite() || x.abs() >= i64::MAX as f64 {
            return Err(EvalError::runtime(
                "OverflowError: cannot convert float infinity or nan to integer",
            ));
        }
        Ok(Value::Int(x as i64))
    })
}

/// A fresh `math` module.
pub fn module() -> Arc<Module> {
    let ns = Namespace::new();
    ns.set("pi", Value::Float(std::f64::consts::PI));
    ns.set("e", Value::Float(std::f64::consts::E));
    ns.set("tau", Value::Float(std::f64::consts::TAU));
    ns.set("inf", Value::Float(f64::INFINITY));
    ns.set("nan", Value::Float(f64::NAN));

    let functions = vec![
        unary("sqrt", f64::sqrt),
        unary("exp", f64::exp),
        unary("sin", f64::sin),
        unary("cos", f64::cos),
        unary("tan", f64::tan),
        unary("asin", f64::asin),
        unary("acos", f64::acos),
        unary("atan", f64::atan),
        unary("fabs", f64::abs),
        unary("log10", f64::log10),
        unary("log2", f64::log2),
        to_int("floor", f64::floor),
        to_int("ceil", f64::ceil),
        to_int("trunc", f64::trunc),
        NativeFunction::new(
            "log",
            Signature::new().param("x").param_with_default("base", Value::None),
            |a| {
                let x = number(a, 0)?;
                if x <= 0.0 {
                    return Err(EvalError::runtime("ValueError: math domain error"));
                }
                match a.arg(1) {
                    Value::None => domain_checked(x.ln()),
                    _ => domain_checked(x.ln() / number(a, 1)?.ln()),
                }
            },
        ),
        NativeFunction::new("pow", Signature::positional(&["x", "y"]), |a| {
            domain_checked(number(a, 0)?.powf(number(a, 1)?))
        }),
        NativeFunction::new("atan2", Signature::positional(&["y", "x"]), |a| {
            Ok(Value::Float(number(a, 0)?.atan2(number(a, 1)?)))
        }),
        NativeFunction::new("hypot", Signature::new().with_var_args("coordinates"), |a| {
            let mut total = 0.0;
            for v in &a.rest {
                let x = v.as_float().ok_or_else(|| {
                    EvalError::runtime(format!("TypeError: must be real number, not {}", v.type_name()))
                })?;
                total += x * x;
            }
            Ok(Value::Float(total.sqrt()))
        }),
        NativeFunction::new("isclose", Signature::new().param("a").param("b").param_with_default("rel_tol", 1e-9), |a| {
            let (x, y, tol) = (number(a, 0)?, number(a, 1)?, number(a, 2)?);
            Ok(Value::Bool((x - y).abs() <= tol * x.abs().max(y.abs())))
        }),
    ];
    for f in functions {
        let name = crate::functions::Callable::name(&f).to_string();
        ns.set(name, f.into_value());
    }

    Arc::new(Module::native(NAME, ns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        module()
            .namespace()
            .get(name)
            .expect("math function")
            .call(args, Vec::new())
    }

    #[test]
    fn constants_and_functions() {
        let m = module();
        assert_eq!(m.namespace().get("pi"), Some(Value::Float(std::f64::consts::PI)));
        assert_eq!(call("sqrt", vec![Value::Int(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(call("floor", vec![Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        let log = call("log", vec![Value::Int(8), Value::Int(2)]).unwrap();
        assert!((log.as_float().unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn domain_errors() {
        assert!(call("sqrt", vec![Value::Int(-1)]).is_err());
        assert!(call("log", vec![Value::Int(0)]).is_err());
        assert!(call("sin", vec![Value::from("x")]).is_err());
    }

    #[test]
    fn each_call_builds_a_fresh_module() {
        let a = module();
        a.namespace().set("pi", Value::Float(3.14));
        assert_eq!(module().namespace().get("pi"), Some(Value::Float(std::f64::consts::PI)));
    }
}
