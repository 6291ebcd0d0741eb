use latebound::{EvalError, LoaderOptions, Runtime, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("latebound-modules-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &Path, rel: &str, source: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, source).unwrap();
}

fn runtime(dir: &Path) -> Runtime {
    Runtime::new(LoaderOptions::default().with_root(dir))
}

#[test]
fn test_package_submodules_load_during_traversal() {
    let dir = scratch("package");
    write(&dir, "models/__init__.py", "version = 2\n");
    write(&dir, "models/linear.py", "def build(scale=1):\n    return {'kind': 'linear', 'scale': scale}\n");
    let rt = runtime(&dir);

    assert_eq!(rt.get_value("models.version", None, true).unwrap(), Some(Value::Int(2)));
    let build = rt.get_value("models.linear.build", None, true).unwrap().unwrap();
    let out = build.call(vec![], vec![("scale".into(), Value::Int(5))]).unwrap();
    assert_eq!(out, Value::from(json!({"kind": "linear", "scale": 5})));
    assert_eq!(rt.get_value("models.nothing_here", None, false).unwrap(), None);
}

#[test]
fn test_imports_inside_code() {
    let dir = scratch("imports");
    write(&dir, "helpers.py", "import math\n\ndef area(r):\n    return math.pi * r ** 2\n");
    write(&dir, "pkg/__init__.py", "");
    write(&dir, "pkg/units.py", "KM = 1000\n");
    let rt = runtime(&dir);

    let code = "from helpers import area\nimport pkg.units\nimport pkg.units as u\ndef total(r):\n    return [area(r), pkg.units.KM, u.KM]\n";
    let total = rt.eval_function(code, None, Some("total"), false).unwrap();
    let out = total.call(vec![Value::Int(1)], vec![]).unwrap();
    assert_eq!(
        out,
        Value::list(vec![
            Value::Float(std::f64::consts::PI),
            Value::Int(1000),
            Value::Int(1000)
        ])
    );
}

#[test]
fn test_modules_resolve_as_bare_names_in_code() {
    let dir = scratch("bare");
    write(&dir, "consts.py", "answer = 42\n");
    let rt = runtime(&dir);
    let f = rt.eval_function("lambda: consts.answer + math.floor(0.5)", None, None, false).unwrap();
    assert_eq!(f.call(vec![], vec![]).unwrap(), Value::Int(42));
}

#[test]
fn test_module_state_is_cached_per_runtime() {
    let dir = scratch("state");
    write(&dir, "counter.py", "hits = 0\n");
    let first = runtime(&dir);
    first.set_value("counter.hits", 5, None).unwrap();
    assert_eq!(first.get_value("counter.hits", None, true).unwrap(), Some(Value::Int(5)));

    let second = runtime(&dir);
    assert_eq!(second.get_value("counter.hits", None, true).unwrap(), Some(Value::Int(0)));
}

#[test]
fn test_broken_module_errors_are_not_suppressed() {
    let dir = scratch("broken");
    write(&dir, "syntax.py", "def f(:\n");
    write(&dir, "raises.py", "x = undefined_thing\n");
    let rt = runtime(&dir);

    let err = rt.get_value("syntax.f", None, false).unwrap_err();
    assert!(matches!(err, EvalError::Parse(_)));
    let err = rt.get_value("raises.x", None, false).unwrap_err();
    assert!(matches!(err, EvalError::Runtime(m) if m.starts_with("NameError")));
}

#[test]
fn test_search_paths_and_extension() {
    let root = scratch("ext-root");
    let extra = scratch("ext-extra");
    write(&extra, "tools.lb", "name = 'from extra'\n");
    let rt = Runtime::new(
        LoaderOptions::default()
            .with_root(&root)
            .with_search_path(&extra)
            .with_extension("lb"),
    );
    assert_eq!(rt.get_value("tools.name", None, true).unwrap(), Some(Value::from("from extra")));
}

#[test]
fn test_from_import_errors() {
    let dir = scratch("from-errors");
    write(&dir, "lib.py", "a = 1\n");
    let rt = runtime(&dir);
    let err = rt
        .eval_function("from lib import b\nc = 1", None, Some("c"), false)
        .unwrap_err();
    assert!(matches!(err, EvalError::Runtime(m) if m.starts_with("ImportError")));
    let err = rt
        .eval_function("import not_a_module_anywhere\nc = 1", None, Some("c"), false)
        .unwrap_err();
    assert!(matches!(err, EvalError::Runtime(m) if m.starts_with("ModuleNotFoundError")));
}
