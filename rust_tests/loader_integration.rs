//! Integration tests for the script loading pipeline

use jasmine_runner::discovery::discover;
use jasmine_runner::environment::{ExecutionScope, ScriptSource};
use jasmine_runner::loader::{self, BOOTSTRAP_SCRIPTS};
use jasmine_runner::resolver::ModuleResolver;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn fresh_scope() -> ExecutionScope {
    ExecutionScope::new(ModuleResolver::default(), &BTreeMap::new()).unwrap()
}

fn eval_string(scope: &mut ExecutionScope, code: &str) -> String {
    scope
        .evaluate(&ScriptSource::bundled("snippet.js", code))
        .unwrap()
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .unwrap()
}

#[test]
fn test_each_bootstrap_script_sees_previous_globals() {
    let mut scope = fresh_scope();
    for script in &BOOTSTRAP_SCRIPTS {
        scope
            .evaluate(&script.source())
            .unwrap_or_else(|e| panic!("{} failed: {}", script.name, e));
    }
    assert_eq!(
        eval_string(&mut scope, "typeof jasmineRequire + ',' + typeof jasmine.getEnv"),
        "object,function"
    );
}

#[test]
fn test_test_files_share_cumulative_scope() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.test.js"), "var sharedFromA = 'A';").unwrap();
    fs::write(
        temp.path().join("b.test.js"),
        "var sharedFromB = sharedFromA + 'B';",
    )
    .unwrap();

    let files = discover(temp.path()).files;
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    assert_eq!(loader::load_test_files(&mut scope, &files).unwrap(), 2);

    assert_eq!(eval_string(&mut scope, "sharedFromB"), "AB");
}

#[test]
fn test_spec_file_global_tracks_current_file() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("nested")).unwrap();
    fs::write(
        temp.path().join("nested/seen.spec.js"),
        "var seenFile = __specFile;",
    )
    .unwrap();

    let files = discover(temp.path()).files;
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    loader::load_test_files(&mut scope, &files).unwrap();

    assert_eq!(eval_string(&mut scope, "seenFile"), "nested/seen.spec.js");
    assert_eq!(eval_string(&mut scope, "__specFile"), "");
}

#[test]
fn test_syntax_error_names_script_and_line() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("bad.test.js"),
        "describe('x', function () {\n  it('y', function () {\n    var = 1;\n  });\n});\n",
    )
    .unwrap();

    let files = discover(temp.path()).files;
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    let err = loader::load_test_files(&mut scope, &files).unwrap_err();

    assert_eq!(err.script, "bad.test.js");
    assert_eq!(err.line, Some(3));
    assert!(err.to_string().starts_with("bad.test.js:3: "), "{}", err);
}

#[test]
fn test_runtime_error_in_describe_body_is_load_error() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("boom.test.js"),
        "var ready = true;\n\ndescribe('boom', function () {\n  var x = 1;\n  missingHelper();\n});\n",
    )
    .unwrap();

    let files = discover(temp.path()).files;
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    let err = loader::load_test_files(&mut scope, &files).unwrap_err();

    assert_eq!(err.script, "boom.test.js");
    assert_eq!(err.line, Some(5));
    assert!(err.message.contains("missingHelper"), "{}", err.message);
    assert!(err.to_string().starts_with("boom.test.js:5: "), "{}", err);
}

#[test]
fn test_loading_stops_at_first_failure() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.test.js"), "throw new Error('first');").unwrap();
    fs::write(temp.path().join("b.test.js"), "var reachedB = true;").unwrap();

    let files = discover(temp.path()).files;
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    assert!(loader::load_test_files(&mut scope, &files).is_err());

    assert_eq!(eval_string(&mut scope, "typeof reachedB"), "undefined");
}

#[test]
fn test_console_shim_is_available_to_test_files() {
    let mut scope = fresh_scope();
    loader::bootstrap(&mut scope).unwrap();
    assert_eq!(
        eval_string(
            &mut scope,
            "[typeof console.log, typeof console.error, typeof console.warn].join(',')"
        ),
        "function,function,function"
    );
}
