//! Dotted-path resolution and assignment.

use tracing::{debug, trace};

use crate::context;
use crate::engine::Runtime;
use crate::errors::{EvalError, Result};
use crate::path::DottedPath;
use crate::value::Value;

/// Whether a missing head segment may be satisfied by loading a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Modules,
    ScopeOnly,
}

fn head(runtime: &Runtime, name: &str, scope: Option<&Value>, fallback: Fallback) -> Result<Option<Value>> {
    let found = match scope {
        Some(scope) => scope.child(name),
        None => context::lookup(name).or_else(|| runtime.builtins().get(name)),
    };
    if found.is_some() || fallback == Fallback::ScopeOnly {
        return Ok(found);
    }
    trace!(name, "head not in scope, trying module loader");
    Ok(runtime.find_module(name)?.map(Value::Module))
}

fn step(runtime: &Runtime, current: &Value, segment: &str, fallback: Fallback) -> Result<Option<Value>> {
    if let Some(v) = current.child(segment) {
        return Ok(Some(v));
    }
    match current {
        Value::Module(module) if module.is_package() && fallback == Fallback::Modules => Ok(runtime
            .loader()
            .load_submodule(runtime, module, segment)?
            .map(Value::Module)),
        _ => Ok(None),
    }
}

/// Walks `segments` from `scope`; `Ok(None)` when some segment is missing.
pub fn walk(
    runtime: &Runtime,
    segments: &[String],
    scope: Option<&Value>,
    fallback: Fallback,
) -> Result<Option<Value>> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(None);
    };
    let Some(mut current) = head(runtime, first, scope, fallback)? else {
        return Ok(None);
    };
    for segment in rest {
        trace!(segment = segment.as_str(), "resolving segment");
        match step(runtime, &current, segment, fallback)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn unresolved(path: &str, strict: bool) -> Result<Option<Value>> {
    if strict {
        Err(EvalError::unresolved(path))
    } else {
        Ok(None)
    }
}

/// Resolves `path` against `scope` (or the registry and builtins when `None`),
/// loading modules for names that are not found.
///
/// Strings that are not plain dotted paths, such as `a.b()`, never resolve.
/// Errors raised while loading a module propagate regardless of `strict`.
pub fn lookup(runtime: &Runtime, path: &str, scope: Option<&Value>, strict: bool) -> Result<Option<Value>> {
    let parsed = match DottedPath::parse(path) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(path, error = %e, "not a dotted path");
            return unresolved(path, strict);
        }
    };
    match walk(runtime, parsed.segments(), scope, Fallback::Modules)? {
        Some(v) => {
            debug!(path, kind = v.type_name(), "resolved");
            Ok(Some(v))
        }
        None => unresolved(path, strict),
    }
}

/// Sets the final segment of `path` on the value its parent segments resolve to.
pub fn assign(runtime: &Runtime, path: &str, value: Value, scope: Option<&Value>) -> Result<()> {
    let parsed = DottedPath::parse(path)
        .map_err(|e| EvalError::assignment(path, format!("not a dotted path ({e})")))?;
    let (parent_segments, last) = parsed.split_last();

    let parent = if parent_segments.is_empty() {
        scope
            .cloned()
            .ok_or_else(|| EvalError::assignment(path, "no scope to assign into"))?
    } else {
        walk(runtime, parent_segments, scope, Fallback::Modules)?.ok_or_else(|| {
            EvalError::assignment(
                path,
                format!("cannot resolve parent '{}'", parent_segments.join(".")),
            )
        })?
    };

    debug!(path, "assigning");
    parent.set_child(last, value).map_err(|e| match e {
        EvalError::Assignment { reason, .. } => EvalError::assignment(path, reason),
        other => other,
    })
}
