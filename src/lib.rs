//! Late binding of symbols and code at run time.
//!
//! - [`get_value`] / [`set_value`] resolve dotted paths such as `config.items.0`
//!   against a scope, the registered contexts, or modules loaded from disk.
//! - [`eval_function`] turns code fragments (an expression, or a block plus a
//!   target name) into values, usually callables.
//! - [`eval`] combines both: a plain path is looked up first, anything else is evaluated.
//! - [`dynamic_args_wrapper`] makes a callable ignore keyword arguments it does not declare.
//! - [`MethodTable`] builds objects whose methods are implemented from code.
//!
//! Code fragments and on-disk modules are written in a small Python-flavoured
//! language, see [`grammar`] and [`interpreter`].

#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod comparison;
pub mod context;
pub mod cursor;
pub mod dynamic;
pub mod engine;
pub mod errors;
pub mod field;
pub mod functions;
pub mod grammar;
pub mod interpreter;
pub mod lexer;
pub mod loader;
pub mod ops;
pub mod path;
pub mod resolver;
pub mod value;

use std::sync::Arc;

pub use dynamic::{DynamicObject, MethodTable};
pub use engine::{Descriptor, FunctionDescriptor, Runtime};
pub use errors::{EvalError, Result};
pub use field::{composite, field, DynamicField};
pub use functions::{Callable, NativeFunction, Signature};
pub use loader::LoaderOptions;
pub use value::{Mapping, Module, Namespace, Object, Scope, Value};

/// Resolves `path` against `context`, or against the registered contexts when
/// `context` is `None`. Missing names fall back to loading a module.
///
/// With `strict = false` an unresolved path yields `Ok(None)`.
pub fn get_value(path: &str, context: Option<&Value>, strict: bool) -> Result<Option<Value>> {
    Runtime::global().get_value(path, context, strict)
}

pub fn set_value(path: &str, value: impl Into<Value>, context: Option<&Value>) -> Result<()> {
    Runtime::global().set_value(path, value, context)
}

pub fn eval_function(
    descriptor: impl Into<Descriptor>,
    context: Option<&Value>,
    target_name: Option<&str>,
    dynamic_args: bool,
) -> Result<Value> {
    Runtime::global().eval_function(descriptor, context, target_name, dynamic_args)
}

pub fn eval(
    source: &str,
    context: Option<&Value>,
    dynamic_args: bool,
    target_name: Option<&str>,
) -> Result<Value> {
    Runtime::global().eval(source, context, dynamic_args, target_name)
}

/// Registers `scope` for lookups without an explicit context. Without a
/// `name`, the scope's own name is used.
pub fn register_context(scope: Value, name: Option<&str>) -> Result<()> {
    context::register(scope, name).map(|_| ())
}

pub fn unregister_context(name: &str) -> Option<Value> {
    context::unregister(name)
}

pub fn dynamic_args_wrapper(callable: Arc<dyn Callable>) -> Arc<dyn Callable> {
    functions::dynamic_args_wrapper(callable)
}
