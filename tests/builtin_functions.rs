use latebound::{LoaderOptions, Runtime, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn eval(code: &str) -> Value {
    let rt = Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()));
    rt.eval(code, None, false, None).unwrap()
}

#[test]
fn test_sequence_builtins() {
    assert_eq!(eval("len('héllo')"), Value::Int(5));
    assert_eq!(eval("sum([1, 2, 3], 10)"), Value::Int(16));
    assert_eq!(eval("max(3, 9, 4)"), Value::Int(9));
    assert_eq!(eval("min([2.5, -1])"), Value::Int(-1));
    assert_eq!(eval("sorted(['b', 'c', 'a'], reverse=True)"), Value::from(json!(["c", "b", "a"])));
    assert_eq!(eval("list(range(1, 10, 3))"), Value::from(json!([1, 4, 7])));
    assert_eq!(eval("list('ab')"), Value::from(json!(["a", "b"])));
}

#[test]
fn test_conversions() {
    assert_eq!(eval("str(1.0)"), Value::from("1.0"));
    assert_eq!(eval("int('12') + int(2.9)"), Value::Int(14));
    assert_eq!(eval("float('0.5')"), Value::Float(0.5));
    assert_eq!(eval("bool([])"), Value::Bool(false));
    assert_eq!(eval("round(1.25, 1)"), Value::Float(1.2));
    assert_eq!(eval("round(3.5)"), Value::Int(4));
    assert_eq!(eval("abs(-4)"), Value::Int(4));
}

#[test]
fn test_higher_order_builtins() {
    assert_eq!(eval("list(map(lambda x: x * x, [1, 2, 3]))"), Value::from(json!([1, 4, 9])));
    assert_eq!(eval("filter(lambda x: x % 2, range(6))"), Value::from(json!([1, 3, 5])));
    assert_eq!(eval("any([0, '', 3]) and not all([1, 0])"), Value::Bool(true));
    assert_eq!(eval("enumerate(['a'], 1)"), Value::from(json!([[1, "a"]])));
    assert_eq!(eval("callable(len) and not callable(3)"), Value::Bool(true));
}

#[test]
fn test_attribute_builtins() {
    assert_eq!(eval("getattr({'a': 1}, 'a')"), Value::Int(1));
    assert_eq!(eval("getattr({'a': 1}, 'b', 0)"), Value::Int(0));
    assert_eq!(eval("hasattr(math, 'tau')"), Value::Bool(true));
}

#[test]
fn test_math_module() {
    assert_eq!(eval("math.sqrt(16)"), Value::Float(4.0));
    assert_eq!(eval("math.ceil(1.2)"), Value::Int(2));
    assert_eq!(eval("math.hypot(3, 4)"), Value::Float(5.0));
    assert!(eval("math.sin").is_callable());
}

#[test]
fn test_string_and_collection_methods() {
    assert_eq!(eval("' a b '.strip().split(' ')"), Value::from(json!(["a", "b"])));
    assert_eq!(eval("', '.join(['x', 'y'])"), Value::from("x, y"));
    assert_eq!(eval("'file.py'.endswith('.py')"), Value::Bool(true));
    assert_eq!(eval("{'k': 1}.get('k')"), Value::Int(1));
    assert_eq!(eval("{'a': 1, 'b': 2}.items()"), Value::from(json!([["a", 1], ["b", 2]])));
}

#[test]
fn test_integer_bounds_in_builtins() {
    let rt = Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()));
    assert_eq!(
        eval("range(9223372036854775806, 9223372036854775807, 2)"),
        Value::from(json!([9223372036854775806i64]))
    );
    assert_eq!(eval("list(range(10, 0, -4))"), Value::from(json!([10, 6, 2])));

    let err = rt.eval("enumerate([1, 2], 9223372036854775807)", None, false, None).unwrap_err();
    assert!(err.to_string().contains("OverflowError"), "{err}");
    assert_eq!(
        eval("enumerate(['a'], 9223372036854775807)"),
        Value::from(json!([[9223372036854775807i64, "a"]]))
    );
}

#[test]
fn test_sequence_repetition_is_bounded() {
    let rt = Runtime::new(LoaderOptions::default().with_root(std::env::temp_dir()));
    for code in ["[1, 2] * 9000000000000000000", "'ab' * 9000000000000000000"] {
        let err = rt.eval(code, None, false, None).unwrap_err();
        assert!(err.to_string().contains("OverflowError"), "{code}: {err}");
    }
    let err = rt.eval("list(range(10 ** 12))", None, false, None).unwrap_err();
    assert!(err.to_string().contains("MemoryError"), "{err}");
}
