//! Integration tests for module resolution, both directly and through
//! `require` inside a bootstrapped scope.

use jasmine_runner::environment::{ExecutionScope, ScriptSource};
use jasmine_runner::loader;
use jasmine_runner::resolver::ModuleResolver;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, body).unwrap();
    path
}

fn scope_with_roots(roots: Vec<PathBuf>) -> ExecutionScope {
    let mut scope = ExecutionScope::new(ModuleResolver::new(roots), &BTreeMap::new()).unwrap();
    loader::bootstrap(&mut scope).unwrap();
    scope
}

fn eval_string(scope: &mut ExecutionScope, code: &str) -> String {
    let value = scope
        .evaluate(&ScriptSource::bundled("snippet.js", code))
        .unwrap_or_else(|e| panic!("evaluation failed: {}", e));
    value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|| panic!("expected a string result"))
}

#[test]
fn test_first_root_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let a = write(first.path(), "lib/util.js", "");
    write(second.path(), "lib/util.js", "");

    let resolver = ModuleResolver::new(vec![first.path().into(), second.path().into()]);
    let found = resolver.resolve("lib/util", None).unwrap();
    assert_eq!(found, a.canonicalize().unwrap());
}

#[test]
fn test_later_root_used_when_earlier_misses() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let b = write(second.path(), "only-here.js", "");

    let resolver = ModuleResolver::new(vec![first.path().into(), second.path().into()]);
    assert_eq!(
        resolver.resolve("only-here", None).unwrap(),
        b.canonicalize().unwrap()
    );
}

#[test]
fn test_js_extension_preferred_over_bare_file() {
    let root = TempDir::new().unwrap();
    let with_ext = write(root.path(), "config.js", "");
    write(root.path(), "config", "");

    let resolver = ModuleResolver::new(vec![root.path().into()]);
    assert_eq!(
        resolver.resolve("config", None).unwrap(),
        with_ext.canonicalize().unwrap()
    );
}

#[test]
fn test_directory_index() {
    let root = TempDir::new().unwrap();
    let index = write(root.path(), "pkg/index.js", "");

    let resolver = ModuleResolver::new(vec![root.path().into()]);
    assert_eq!(
        resolver.resolve("pkg", None).unwrap(),
        index.canonicalize().unwrap()
    );
}

#[test]
fn test_relative_id_uses_base_dir() {
    let root = TempDir::new().unwrap();
    let sibling = write(root.path(), "a/b/sibling.js", "");

    let resolver = ModuleResolver::new(vec![root.path().into()]);
    let base = root.path().join("a/b");
    assert_eq!(
        resolver.resolve("./sibling", Some(&base)).unwrap(),
        sibling.canonicalize().unwrap()
    );
    let parent = write(root.path(), "a/up.js", "");
    assert_eq!(
        resolver.resolve("../up", Some(&base)).unwrap(),
        parent.canonicalize().unwrap()
    );
}

#[test]
fn test_unresolvable_names_the_id() {
    let root = TempDir::new().unwrap();
    let resolver = ModuleResolver::new(vec![root.path().into()]);
    let err = resolver.resolve("nope/missing", None).unwrap_err();
    assert_eq!(err.id, "nope/missing");
    assert!(err.to_string().starts_with("Cannot find module 'nope/missing'"));
}

#[test]
fn test_require_from_source_root() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "lib/math.js",
        "exports.add = function (a, b) { return a + b; };",
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    assert_eq!(eval_string(&mut scope, "String(require('lib/math').add(2, 3))"), "5");
}

#[test]
fn test_nested_relative_require_and_module_exports() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "lib/greeter.js",
        "var fmt = require('./format');\nmodule.exports = function (n) { return fmt.wrap(n); };",
    );
    write(
        root.path(),
        "lib/format.js",
        "exports.wrap = function (s) { return '<' + s + '>'; };",
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    assert_eq!(eval_string(&mut scope, "require('lib/greeter')('x')"), "<x>");
}

#[test]
fn test_modules_are_cached() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "counter.js",
        "globalThis.loads = (globalThis.loads || 0) + 1; exports.n = loads;",
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    assert_eq!(
        eval_string(
            &mut scope,
            "require('counter'); require('./counter'); String(globalThis.loads)"
        ),
        "1"
    );
}

#[test]
fn test_cyclic_require_sees_partial_exports() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "a.js",
        "exports.early = 'a-early';\nvar b = require('./b');\nexports.fromB = b.seen;",
    );
    write(root.path(), "b.js", "exports.seen = require('./a').early;");

    let mut scope = scope_with_roots(vec![root.path().into()]);
    assert_eq!(eval_string(&mut scope, "require('a').fromB"), "a-early");
}

#[test]
fn test_module_filename_and_dirname() {
    let root = TempDir::new().unwrap();
    let path = write(
        root.path(),
        "where/am_i.js",
        "module.exports = [__filename, __dirname].join('|');",
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    let canonical = path.canonicalize().unwrap();
    let expected = format!(
        "{}|{}",
        canonical.display(),
        canonical.parent().unwrap().display()
    );
    assert_eq!(eval_string(&mut scope, "require('where/am_i')"), expected);
    // Only module factories receive `__dirname`
    assert_eq!(eval_string(&mut scope, "typeof __dirname"), "undefined");
}

#[test]
fn test_missing_module_throws_in_script() {
    let mut scope = scope_with_roots(vec![]);
    assert_eq!(
        eval_string(
            &mut scope,
            r#"(function () {
                try { require('ghost'); return 'no error'; }
                catch (e) { return e.message.indexOf("Cannot find module 'ghost'") === 0 ? 'ok' : e.message; }
            })()"#
        ),
        "ok"
    );
}

#[test]
fn test_syntax_error_in_module_names_the_file() {
    let root = TempDir::new().unwrap();
    write(root.path(), "broken.js", "exports.x = ;");

    let mut scope = scope_with_roots(vec![root.path().into()]);
    let err = scope
        .evaluate(&ScriptSource::bundled("users.test.js", "require('broken');"))
        .unwrap_err();
    assert_eq!(err.script, "users.test.js");
    assert!(err.message.contains("broken.js:1:"), "{}", err.message);
}

#[test]
fn test_module_error_reports_requiring_line() {
    let root = TempDir::new().unwrap();
    write(root.path(), "lib/explode.js", "module.exports = 1;\nthrow new Error('explode');\n");
    let spec = write(
        root.path(),
        "spec/uses.test.js",
        "var a = 1;\nvar b = require('lib/explode');\n",
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    let err = scope
        .evaluate(&ScriptSource::from_file("uses.test.js", &spec).unwrap())
        .unwrap_err();
    assert_eq!(err.script, "uses.test.js");
    assert_eq!(err.line, Some(2));
    assert!(err.message.contains("explode"), "{}", err.message);
}

#[test]
fn test_require_cannot_reach_files_outside_source_roots() {
    let root = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let secret = write(outside.path(), "secret.js", "module.exports = 'leaked';");
    let absolute = secret.to_string_lossy().replace('\\', "/");
    let lib = root.path().canonicalize().unwrap().join("lib");
    let climb = "../".repeat(lib.components().count());
    write(
        root.path(),
        "lib/escape.js",
        &format!(
            "module.exports = require('{}{}');",
            climb,
            absolute.trim_start_matches('/')
        ),
    );

    let mut scope = scope_with_roots(vec![root.path().into()]);
    let outcome = |scope: &mut ExecutionScope, id: &str| {
        eval_string(
            scope,
            &format!(
                r#"(function () {{
                    try {{ return require('{}'); }}
                    catch (e) {{ return e.message.indexOf('Cannot find module') === 0 ? 'rejected' : e.message; }}
                }})()"#,
                id
            ),
        )
    };

    assert_eq!(outcome(&mut scope, &absolute), "rejected");
    assert_eq!(outcome(&mut scope, "lib/escape"), "rejected");
}
