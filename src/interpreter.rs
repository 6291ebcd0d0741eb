//! Tree-walking interpreter for the snippet language.
//!
//! Name lookup walks function frames from the innermost outwards, then the
//! globals frame (a module namespace or an evaluation scope), then the
//! builtins, and finally the module loader.

use std::cell::Cell;
use std::sync::Arc;

use tracing::trace;

use crate::ast::{Body, CmpOp, Expr, FunctionDef, Program, Stmt, Target};
use crate::comparison::compare_with;
use crate::engine::Runtime;
use crate::errors::{EvalError, Result};
use crate::functions::methods::bound_method;
use crate::functions::{Callable, Kwargs, Param, Signature};
use crate::ops;
use crate::value::{Mapping, Namespace, Value};

const MAX_CALL_DEPTH: usize = 64;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(EvalError::runtime(
                    "RecursionError: maximum recursion depth exceeded",
                ));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// One frame of the lexical scope chain.
struct Env {
    vars: Namespace,
    parent: Option<Arc<Env>>,
}

impl Env {
    fn root(globals: Namespace) -> Arc<Env> {
        Arc::new(Env {
            vars: globals,
            parent: None,
        })
    }

    fn child(parent: &Arc<Env>, vars: Namespace) -> Arc<Env> {
        Arc::new(Env {
            vars,
            parent: Some(parent.clone()),
        })
    }

    fn get(&self, name: &str) -> Option<Value> {
        let mut env = Some(self);
        while let Some(frame) = env {
            if let Some(v) = frame.vars.get(name) {
                return Some(v);
            }
            env = frame.parent.as_deref();
        }
        None
    }
}

enum Flow {
    Normal,
    Return(Value),
}

/// A function or lambda defined in snippet code.
///
/// The closure keeps its defining frames alive. A `def` is bound inside the
/// namespace it captures, so that namespace (and every value in it) lives as
/// long as the process; reference counting never reclaims the cycle.
pub struct Closure {
    def: Arc<FunctionDef>,
    signature: Signature,
    env: Arc<Env>,
    runtime: Runtime,
}

impl Callable for Closure {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let _guard = DepthGuard::enter()?;
        let bound = self.signature.bind(&self.def.name, args, kwargs)?;

        let frame = Namespace::new();
        for (param, value) in self.signature.params.iter().zip(bound.values) {
            frame.set(param.name.clone(), value);
        }
        if let Some(name) = &self.def.var_args {
            frame.set(name.clone(), Value::list(bound.rest));
        }
        if let Some(name) = &self.def.var_kwargs {
            frame.set(name.clone(), Value::dict(bound.extra));
        }

        let env = Env::child(&self.env, frame);
        let interp = Interpreter {
            runtime: &self.runtime,
        };
        match &self.def.body {
            Body::Expr(expr) => interp.eval(expr, &env),
            Body::Block(stmts) => match interp.exec_block(stmts, &env)? {
                Flow::Return(v) => Ok(v),
                Flow::Normal => Ok(Value::None),
            },
        }
    }
}

/// Evaluates a single expression against `globals`.
pub fn eval_in(runtime: &Runtime, expr: &Expr, globals: &Namespace) -> Result<Value> {
    let env = Env::root(globals.clone());
    Interpreter { runtime }.eval(expr, &env)
}

/// Executes a program, binding its top-level names into `globals`.
pub fn run(runtime: &Runtime, program: &Program, globals: &Namespace) -> Result<()> {
    let env = Env::root(globals.clone());
    match (Interpreter { runtime }).exec_block(&program.body, &env)? {
        Flow::Normal => Ok(()),
        Flow::Return(_) => Err(EvalError::Parse("'return' outside function".into())),
    }
}

struct Interpreter<'r> {
    runtime: &'r Runtime,
}

impl Interpreter<'_> {
    fn exec_block(&self, stmts: &[Stmt], env: &Arc<Env>) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(v) = self.exec(stmt, env)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, env: &Arc<Env>) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, env)?;
                self.assign(target, value, env)?;
            }
            Stmt::Def(def) => {
                let f = self.closure(def, env)?;
                env.vars.set(def.name.clone(), f);
            }
            Stmt::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval(e, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(v));
            }
            Stmt::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond, env)?.truthy() {
                        return self.exec_block(body, env);
                    }
                }
                return self.exec_block(orelse, env);
            }
            Stmt::For { var, iter, body } => {
                let iterable = self.eval(iter, env)?;
                let items = iterable.iter_items().ok_or_else(|| {
                    EvalError::runtime(format!(
                        "TypeError: '{}' object is not iterable",
                        iterable.type_name()
                    ))
                })?;
                for item in items {
                    env.vars.set(var.clone(), item);
                    if let Flow::Return(v) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            Stmt::Pass => {}
            Stmt::Import { module, alias } => {
                let leaf = self.runtime.import_module(module)?;
                match alias {
                    Some(alias) => env.vars.set(alias.clone(), Value::Module(leaf)),
                    None => {
                        let top = module.split('.').next().unwrap_or(module);
                        let top_module = self.runtime.import_module(top)?;
                        env.vars.set(top.to_string(), Value::Module(top_module));
                    }
                }
            }
            Stmt::FromImport { module, names } => {
                let source = self.runtime.import_module(module)?;
                for (name, alias) in names {
                    let value = match source.namespace().get(name) {
                        Some(v) => v,
                        None if source.is_package() => {
                            Value::Module(self.runtime.import_module(&format!("{module}.{name}"))?)
                        }
                        None => {
                            return Err(EvalError::runtime(format!(
                                "ImportError: cannot import name '{name}' from '{module}'"
                            )))
                        }
                    };
                    env.vars.set(alias.as_ref().unwrap_or(name).clone(), value);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&self, target: &Target, value: Value, env: &Arc<Env>) -> Result<()> {
        match target {
            Target::Name(name) => {
                env.vars.set(name.clone(), value);
                Ok(())
            }
            Target::Attr(obj, name) => {
                let obj = self.eval(obj, env)?;
                obj.set_child(name, value).map_err(|e| match e {
                    EvalError::Assignment { reason, .. } => {
                        EvalError::runtime(format!("AttributeError: {reason}"))
                    }
                    other => other,
                })
            }
            Target::Index(obj, index) => {
                let obj = self.eval(obj, env)?;
                let index = self.eval(index, env)?;
                ops::set_index(&obj, &index, value)
            }
        }
    }

    fn closure(&self, def: &Arc<FunctionDef>, env: &Arc<Env>) -> Result<Value> {
        let mut params = Vec::with_capacity(def.params.len());
        for p in &def.params {
            let default = match &p.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            };
            params.push(Param {
                name: p.name.clone(),
                default,
            });
        }
        let signature = Signature {
            params,
            var_args: def.var_args.clone(),
            var_kwargs: def.var_kwargs.clone(),
        };
        Ok(Value::function(Closure {
            def: def.clone(),
            signature,
            env: env.clone(),
            runtime: self.runtime.clone(),
        }))
    }

    fn lookup(&self, name: &str, env: &Env) -> Result<Value> {
        if let Some(v) = env.get(name) {
            return Ok(v);
        }
        if let Some(v) = self.runtime.builtins().get(name) {
            return Ok(v);
        }
        if let Some(module) = self.runtime.find_module(name)? {
            trace!(name, "name resolved through the module loader");
            return Ok(Value::Module(module));
        }
        Err(EvalError::runtime(format!(
            "NameError: name '{name}' is not defined"
        )))
    }

    fn attribute(&self, obj: &Value, name: &str) -> Result<Value> {
        if let Some(v) = obj.child(name) {
            return Ok(v);
        }
        if let Some(m) = bound_method(obj, name) {
            return Ok(m);
        }
        if let Value::Module(module) = obj {
            if module.is_package() {
                let sub = self
                    .runtime
                    .import_module(&format!("{}.{name}", module.name()))?;
                return Ok(Value::Module(sub));
            }
        }
        Err(EvalError::runtime(format!(
            "AttributeError: '{}' object has no attribute '{name}'",
            obj.type_name()
        )))
    }

    fn eval(&self, expr: &Expr, env: &Arc<Env>) -> Result<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Name(name) => self.lookup(name, env),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Dict(pairs) => {
                let mut out = Mapping::new();
                for (k, v) in pairs {
                    let key = match self.eval(k, env)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(EvalError::runtime(format!(
                                "TypeError: dict keys must be str, not '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    out.insert(key, self.eval(v, env)?);
                }
                Ok(Value::dict(out))
            }
            Expr::Attr(obj, name) => {
                let obj = self.eval(obj, env)?;
                self.attribute(&obj, name)
            }
            Expr::Index(obj, index) => {
                let obj = self.eval(obj, env)?;
                let index = self.eval(index, env)?;
                ops::get_index(&obj, &index)
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func, env)?;
                let args = args
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<Result<Vec<_>>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, e)| -> Result<(String, Value)> { Ok((k.clone(), self.eval(e, env)?)) })
                    .collect::<Result<Kwargs>>()?;
                func.call(args, kwargs)
            }
            Expr::Unary(op, operand) => ops::unary(*op, &self.eval(operand, env)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                ops::binary(*op, &lhs, &rhs)
            }
            Expr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                compare(*op, &lhs, &rhs).map(Value::Bool)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                if lhs.truthy() {
                    self.eval(rhs, env)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                if lhs.truthy() {
                    Ok(lhs)
                } else {
                    self.eval(rhs, env)
                }
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Lambda(def) => self.closure(def, env),
        }
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let ordered = |symbol: &str, pred: fn(std::cmp::Ordering) -> bool| {
        compare_with(lhs, rhs, pred).ok_or_else(|| {
            EvalError::runtime(format!(
                "TypeError: '{symbol}' not supported between instances of '{}' and '{}'",
                lhs.type_name(),
                rhs.type_name()
            ))
        })
    };
    match op {
        CmpOp::Eq => Ok(lhs == rhs),
        CmpOp::Ne => Ok(lhs != rhs),
        CmpOp::Lt => ordered("<", |o| o.is_lt()),
        CmpOp::Lte => ordered("<=", |o| o.is_le()),
        CmpOp::Gt => ordered(">", |o| o.is_gt()),
        CmpOp::Gte => ordered(">=", |o| o.is_ge()),
        CmpOp::In => ops::contains(rhs, lhs),
        CmpOp::NotIn => ops::contains(rhs, lhs).map(|found| !found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse_program;
    use crate::loader::LoaderOptions;
    use pretty_assertions::assert_eq;

    fn runtime() -> Runtime {
        Runtime::new(LoaderOptions::default().without_native_modules())
    }

    fn exec(src: &str) -> Namespace {
        let globals = Namespace::new();
        run(&runtime(), &parse_program(src).unwrap(), &globals).unwrap();
        globals
    }

    fn eval(src: &str) -> Result<Value> {
        let program = parse_program(src)?;
        let expr = program.as_expression().expect("single expression");
        eval_in(&runtime(), expr, &Namespace::new())
    }

    #[test]
    fn arithmetic_and_logic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval("0 or 'x'").unwrap(), Value::from("x"));
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("'b' in ['a', 'b']").unwrap(), Value::Bool(true));
        assert_eq!(eval("'yes' if 0 else 'no'").unwrap(), Value::from("no"));
    }

    #[test]
    fn functions_and_closures() {
        let g = exec(
            "def make(n):\n    def add(x):\n        return x + n\n    return add\nadd2 = make(2)\nr = add2(5)\n",
        );
        assert_eq!(g.get("r"), Some(Value::Int(7)));
    }

    #[test]
    fn defaults_and_var_args() {
        let g = exec("def f(a, b=10, *rest, **kw):\n    return [a, b, len(rest), len(kw)]\nr = f(1, 2, 3, x=4)\n");
        assert_eq!(
            g.get("r"),
            Some(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(1), Value::Int(1)]))
        );
    }

    #[test]
    fn control_flow() {
        let g = exec(
            "total = 0\nfor i in range(5):\n    if i % 2 == 0:\n        total += i\n    elif i == 3:\n        pass\n    else:\n        total = total - 1\n",
        );
        assert_eq!(g.get("total"), Some(Value::Int(4)));
    }

    #[test]
    fn attribute_and_subscript_assignment() {
        let g = exec("d = {'a': 1}\nd['b'] = 2\nd.c = 3\nxs = [1, 2]\nxs[0] = 5\n");
        assert_eq!(g.get("d").unwrap().child("b"), Some(Value::Int(2)));
        assert_eq!(g.get("d").unwrap().child("c"), Some(Value::Int(3)));
        assert_eq!(g.get("xs"), Some(Value::list(vec![Value::Int(5), Value::Int(2)])));
    }

    #[test]
    fn method_calls() {
        assert_eq!(eval("'a-b'.split('-')[1].upper()").unwrap(), Value::from("B"));
    }

    #[test]
    fn runtime_errors() {
        assert!(matches!(eval("undefined_name"), Err(EvalError::Runtime(m)) if m.starts_with("NameError")));
        assert!(matches!(eval("1 / 0"), Err(EvalError::Runtime(m)) if m.starts_with("ZeroDivisionError")));
        assert!(matches!(eval("1 < 'a'"), Err(EvalError::Runtime(m)) if m.starts_with("TypeError")));
    }

    #[test]
    fn unbounded_recursion_is_an_error() {
        let globals = Namespace::new();
        let rt = runtime();
        run(&rt, &parse_program("def f(n):\n    return f(n + 1)\n").unwrap(), &globals).unwrap();
        let err = globals.get("f").unwrap().call(vec![Value::Int(0)], Vec::new()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(m) if m.starts_with("RecursionError")));
    }

    #[test]
    fn top_level_return_is_rejected() {
        let program = parse_program("return 1").unwrap();
        assert!(run(&runtime(), &program, &Namespace::new()).is_err());
    }
}
