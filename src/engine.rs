use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::context;
use crate::errors::{EvalError, Result};
use crate::functions::{dynamic_args_wrapper, Callable, Registry};
use crate::grammar::parse_program;
use crate::interpreter;
use crate::loader::{Loader, LoaderOptions};
use crate::path::DottedPath;
use crate::resolver::{self, Fallback};
use crate::value::{Mapping, Module, Namespace, Value};

lazy_static! {
    static ref DEFAULT_RUNTIME: Runtime = Runtime::new(LoaderOptions::from_env());
}

/// =========================
/// Function descriptors
/// =========================

/// Code plus the context it runs in and the name to extract afterwards.
///
/// Deserializes from `{"code": "...", "context": {...}, "target_name": "..."}`;
/// `function_of_interest` is accepted as an alias of `target_name`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionDescriptor {
    pub code: String,
    #[serde(default)]
    pub context: Option<Mapping>,
    #[serde(default, alias = "function_of_interest")]
    pub target_name: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            context: None,
            target_name: None,
        }
    }

    pub fn with_context(mut self, context: Mapping) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }
}

/// Anything `eval_function` accepts.
pub enum Descriptor {
    Code(String),
    Structured(FunctionDescriptor),
    /// Already callable; returned as is.
    Callable(Arc<dyn Callable>),
}

impl From<&str> for Descriptor {
    fn from(code: &str) -> Self {
        Descriptor::Code(code.to_string())
    }
}

impl From<String> for Descriptor {
    fn from(code: String) -> Self {
        Descriptor::Code(code)
    }
}

impl From<FunctionDescriptor> for Descriptor {
    fn from(d: FunctionDescriptor) -> Self {
        Descriptor::Structured(d)
    }
}

impl From<Arc<dyn Callable>> for Descriptor {
    fn from(f: Arc<dyn Callable>) -> Self {
        Descriptor::Callable(f)
    }
}

impl TryFrom<Value> for Descriptor {
    type Error = EvalError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Str(code) => Ok(Descriptor::Code(code)),
            Value::Function(f) => Ok(Descriptor::Callable(f)),
            Value::Dict(ns) => {
                let code = ns.get("code").and_then(|c| c.as_str().map(str::to_string)).ok_or_else(|| {
                    EvalError::InvalidContext("descriptor mapping needs a string 'code' entry".into())
                })?;
                let context = match ns.get("context") {
                    None | Some(Value::None) => None,
                    Some(ctx) => Some(ctx.entries().ok_or_else(|| {
                        EvalError::InvalidContext(format!(
                            "descriptor context must be a mapping, not {}",
                            ctx.type_name()
                        ))
                    })?),
                };
                let target_name = ns
                    .get("target_name")
                    .or_else(|| ns.get("function_of_interest"))
                    .and_then(|t| t.as_str().map(str::to_string));
                Ok(Descriptor::Structured(FunctionDescriptor {
                    code,
                    context,
                    target_name,
                }))
            }
            other => Err(EvalError::InvalidContext(format!(
                "cannot build a function descriptor from a {}",
                other.type_name()
            ))),
        }
    }
}

fn finish(value: Value, dynamic_args: bool) -> Value {
    match value {
        Value::Function(f) if dynamic_args => Value::Function(dynamic_args_wrapper(f)),
        other => other,
    }
}

/// =========================
/// Runtime
/// =========================

/// A module loader and builtins, with every public operation bound to them.
///
/// The free functions in the crate root use [`Runtime::global`]. Build your
/// own runtime to isolate module caches, e.g. in tests.
#[derive(Clone)]
pub struct Runtime {
    loader: Loader,
    builtins: Registry,
}

impl Runtime {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            loader: Loader::new(options),
            builtins: Registry::with_builtins(),
        }
    }

    /// The shared default runtime, configured from the environment on first use.
    pub fn global() -> &'static Runtime {
        &DEFAULT_RUNTIME
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn builtins(&self) -> &Registry {
        &self.builtins
    }

    pub fn find_module(&self, name: &str) -> Result<Option<Arc<Module>>> {
        self.loader.load(self, name)
    }

    /// Loads a dotted module name, importing each package along the way.
    pub fn import_module(&self, dotted: &str) -> Result<Arc<Module>> {
        let not_found = || EvalError::runtime(format!("ModuleNotFoundError: No module named '{dotted}'"));
        let mut parts = dotted.split('.');
        let first = parts.next().unwrap_or_default();
        let mut module = self.find_module(first)?.ok_or_else(not_found)?;
        for part in parts {
            module = match module.namespace().get(part) {
                Some(Value::Module(sub)) => sub,
                _ => self
                    .loader
                    .load_submodule(self, &module, part)?
                    .ok_or_else(not_found)?,
            };
        }
        Ok(module)
    }

    /// Resolves a dotted path. See [`resolver::lookup`].
    pub fn get_value(&self, path: &str, context: Option<&Value>, strict: bool) -> Result<Option<Value>> {
        resolver::lookup(self, path, context, strict)
    }

    pub fn set_value(&self, path: &str, value: impl Into<Value>, context: Option<&Value>) -> Result<()> {
        resolver::assign(self, path, value.into(), context)
    }

    /// Fresh namespace holding the registered contexts, then the caller's
    /// context, then the descriptor's own context; later entries win.
    pub fn effective_scope(&self, context: Option<&Value>, own: Option<&Mapping>) -> Result<Namespace> {
        let scope = Namespace::from_mapping(context::resolve_all());
        if let Some(ctx) = context {
            let entries = ctx.entries().ok_or_else(|| {
                EvalError::InvalidContext(format!("a {} cannot be used as a context", ctx.type_name()))
            })?;
            scope.extend(entries);
        }
        if let Some(own) = own {
            scope.extend(own.clone());
        }
        Ok(scope)
    }

    /// Turns a descriptor into a value, usually a callable.
    ///
    /// A single expression evaluates directly. Anything else is executed as a
    /// block inside a fresh scope, and `target_name` picks the result out of it.
    /// A structured descriptor's own target name takes precedence.
    ///
    /// Functions defined with `def` hold the scope they were defined in, and
    /// that scope holds them, so a block evaluation retains its whole effective
    /// scope (caller context values included). A single expression does not.
    pub fn eval_function(
        &self,
        descriptor: impl Into<Descriptor>,
        context: Option<&Value>,
        target_name: Option<&str>,
        dynamic_args: bool,
    ) -> Result<Value> {
        let (code, own_context, own_target) = match descriptor.into() {
            Descriptor::Callable(f) => return Ok(finish(Value::Function(f), dynamic_args)),
            Descriptor::Code(code) => (code, None, None),
            Descriptor::Structured(d) => (d.code, d.context, d.target_name),
        };
        let target = own_target.or_else(|| target_name.map(str::to_string));
        let scope = self.effective_scope(context, own_context.as_ref())?;
        let value = self.evaluate_code(&code, &scope, target.as_deref())?;
        Ok(finish(value, dynamic_args))
    }

    fn evaluate_code(&self, code: &str, scope: &Namespace, target: Option<&str>) -> Result<Value> {
        let program = parse_program(code)?;
        if let Some(expr) = program.as_expression() {
            debug!(target_name = target, "evaluating expression");
            return interpreter::eval_in(self, expr, scope);
        }

        let target = target.ok_or_else(|| {
            EvalError::MissingTarget("a block of statements needs a target name".into())
        })?;
        let target_path = DottedPath::parse(target)
            .map_err(|e| EvalError::MissingTarget(format!("{target} ({e})")))?;

        debug!(target_name = target, statements = program.body.len(), "executing block");
        interpreter::run(self, &program, scope)?;

        let scope = Value::Dict(scope.clone());
        resolver::walk(self, target_path.segments(), Some(&scope), Fallback::ScopeOnly)?
            .ok_or_else(|| EvalError::MissingTarget(format!("{target} is not defined by the code")))
    }

    /// Resolves `source` as a dotted path when it is one, falling back to
    /// evaluating it as code.
    ///
    /// If both fail for a plain path, the lookup error is reported.
    pub fn eval(
        &self,
        source: &str,
        context: Option<&Value>,
        dynamic_args: bool,
        target_name: Option<&str>,
    ) -> Result<Value> {
        if DottedPath::is_pure(source) {
            let scope = Value::Dict(self.effective_scope(context, None)?);
            match resolver::lookup(self, source, Some(&scope), true) {
                Ok(Some(v)) => return Ok(finish(v, dynamic_args)),
                Ok(None) => {}
                Err(e) if e.is_unresolved() => {
                    debug!(path = source, "lookup failed, evaluating as code");
                    return self
                        .eval_function(source, context, target_name, dynamic_args)
                        .map_err(|_| e);
                }
                Err(e) => return Err(e),
            }
        }
        self.eval_function(source, context, target_name, dynamic_args)
    }
}
