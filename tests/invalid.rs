use latebound::{EvalError, LoaderOptions, Object, Runtime, Value};
use serde_json::json;

fn runtime() -> Runtime {
    Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()))
}

// Call syntax is never evaluated by path lookup; lenient lookups report it as absent.
#[test]
fn test_call_syntax_is_not_a_path() {
    let rt = runtime();
    assert_eq!(rt.get_value("math.floor(1.5)", None, false).unwrap(), None);
    let err = rt.get_value("math.floor(1.5)", None, true).unwrap_err();
    assert!(err.is_unresolved());
}

#[test]
fn test_syntax_errors_surface_as_parse_errors() {
    let rt = runtime();
    for code in ["lambda x: ", "def f(x) return x", "1 +", "(1, 2", "x = = 1"] {
        let err = rt.eval_function(code, None, Some("f"), false).unwrap_err();
        assert!(matches!(err, EvalError::Parse(_)), "{code:?} gave {err:?}");
    }
}

#[test]
fn test_runtime_errors_are_not_translated() {
    let rt = runtime();
    let f = rt.eval_function("lambda x: x / 0", None, None, false).unwrap();
    let err = f.call(vec![Value::Int(1)], vec![]).unwrap_err();
    assert!(matches!(err, EvalError::Runtime(ref m) if m.starts_with("ZeroDivisionError")));

    let err = rt
        .eval_function("raise_me = undefined + 1", None, Some("raise_me"), false)
        .unwrap_err();
    assert!(matches!(err, EvalError::Runtime(ref m) if m.starts_with("NameError")));
}

#[test]
fn test_wrong_arity_is_a_type_error() {
    let rt = runtime();
    let f = rt.eval_function("lambda x: x", None, None, false).unwrap();
    let err = f.call(vec![], vec![]).unwrap_err();
    assert!(matches!(err, EvalError::Runtime(ref m) if m.starts_with("TypeError")));
    let err = f
        .call(vec![Value::Int(1)], vec![("verbose".to_string(), Value::Bool(true))])
        .unwrap_err();
    assert!(matches!(err, EvalError::Runtime(ref m) if m.contains("unexpected keyword")));
}

#[test]
fn test_assignment_failures() {
    let rt = runtime();
    let err = rt.set_value("nowhere_at_all.x", 1, None).unwrap_err();
    assert!(matches!(err, EvalError::Assignment { .. }));

    let err = rt.set_value("bare_name", 1, None).unwrap_err();
    assert!(matches!(err, EvalError::Assignment { .. }));

    let context = Value::from(json!({"n": 1, "items": [1]}));
    let err = rt.set_value("n.x", 2, Some(&context)).unwrap_err();
    assert!(matches!(err, EvalError::Assignment { ref path, .. } if path == "n.x"));
    let err = rt.set_value("items.3", 2, Some(&context)).unwrap_err();
    assert!(matches!(err, EvalError::Assignment { .. }));
    assert_eq!(context.child("n"), Some(Value::Int(1)));
}

#[test]
fn test_read_only_scope_rejects_assignment() {
    struct Fixed;
    impl latebound::Scope for Fixed {
        fn get_attr(&self, name: &str) -> Option<Value> {
            (name == "x").then_some(Value::Int(1))
        }
    }
    let rt = runtime();
    let scope = Value::object(Fixed);
    assert_eq!(rt.get_value("x", Some(&scope), true).unwrap(), Some(Value::Int(1)));
    let err = rt.set_value("x", 2, Some(&scope)).unwrap_err();
    assert!(matches!(err, EvalError::Assignment { .. }));
}

#[test]
fn test_invalid_contexts() {
    let rt = runtime();
    let err = rt.eval_function("1", Some(&Value::Int(3)), None, false).unwrap_err();
    assert!(matches!(err, EvalError::InvalidContext(_)));

    let err = latebound::register_context(Value::Int(3), None).unwrap_err();
    assert!(matches!(err, EvalError::InvalidContext(_)));
    let unnamed = Object::new().into_value();
    assert!(latebound::register_context(unnamed, None).is_err());
}

#[test]
fn test_target_must_exist_after_execution() {
    let rt = runtime();
    let err = rt
        .eval_function("def g(): return 1", None, Some("f"), false)
        .unwrap_err();
    assert!(matches!(err, EvalError::MissingTarget(_)));
    let err = rt
        .eval_function("def g(): return 1", None, Some("g("), false)
        .unwrap_err();
    assert!(matches!(err, EvalError::MissingTarget(_)));
}

#[test]
fn test_deep_nesting_is_a_parse_error() {
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let rt = runtime();
            let shallow = format!("{}1{}", "(".repeat(40), ")".repeat(40));
            assert_eq!(rt.eval(&shallow, None, false, None).unwrap(), Value::Int(1));

            let deep = format!("{}1{}", "(".repeat(3000), ")".repeat(3000));
            let err = rt.eval(&deep, None, false, None).unwrap_err();
            assert!(matches!(err, EvalError::Parse(ref m) if m.contains("too many nested")));

            let unary = format!("{}1", "-".repeat(3000));
            let err = rt.eval(&unary, None, false, None).unwrap_err();
            assert!(matches!(err, EvalError::Parse(_)));
        })
        .unwrap();
    handle.join().unwrap();
}
