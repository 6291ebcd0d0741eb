// Changes the process working directory, so it lives alone in its own test binary.
use latebound::{LoaderOptions, Runtime, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_config_module_found_in_current_directory() {
    let dir = std::env::temp_dir().join(format!("latebound-cwd-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.py"),
        "def sort(xs):\n    return sorted(xs, reverse=True)\n",
    )
    .unwrap();
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(&dir).unwrap();

    let runtime = Runtime::new(LoaderOptions::default());
    let sort = runtime.get_value("config.sort", None, false).unwrap().unwrap();
    let out = sort.call(vec![Value::from(json!([2, 9, 4]))], vec![]).unwrap();
    assert_eq!(out, Value::from(json!([9, 4, 2])));

    std::fs::remove_file(dir.join("config.py")).unwrap();
    let fresh = Runtime::new(LoaderOptions::default());
    assert_eq!(fresh.get_value("config.sort", None, false).unwrap(), None);

    std::env::set_current_dir(previous).unwrap();
}
