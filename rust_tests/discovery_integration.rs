//! Integration tests for the discovery module
//!
//! Fixture trees are built in temp directories so results do not depend on
//! the layout of this repository.

use jasmine_runner::discovery::{discover, discover_with_suffixes};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

fn labels(root: &Path) -> Vec<String> {
    discover(root).files.into_iter().map(|f| f.label).collect()
}

#[test]
fn test_discover_empty_temp_directory() {
    let temp = TempDir::new().unwrap();
    let result = discover(temp.path());
    assert!(result.is_empty());
    assert_eq!(result.file_count(), 0);
}

#[test]
fn test_discover_missing_root_is_empty() {
    let temp = TempDir::new().unwrap();
    let result = discover(&temp.path().join("does-not-exist"));
    assert!(result.is_empty());
    assert!(result.unreadable.is_empty());
}

#[test]
fn test_both_conventions_found_recursively() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "foo.test.js");
    touch(temp.path(), "nested/deep/bar.spec.js");
    touch(temp.path(), "nested/helper.js");
    touch(temp.path(), "README.md");
    touch(temp.path(), "nested/test.js");

    assert_eq!(labels(temp.path()), vec!["foo.test.js", "nested/deep/bar.spec.js"]);
}

#[test]
fn test_directories_with_matching_names_are_traversed_not_included() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("odd.test.js")).unwrap();
    touch(temp.path(), "odd.test.js/inner.spec.js");

    assert_eq!(labels(temp.path()), vec!["odd.test.js/inner.spec.js"]);
}

#[test]
fn test_hidden_and_vendor_directories_are_not_skipped() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), ".hidden/a.test.js");
    touch(temp.path(), "node_modules/pkg/b.spec.js");

    assert_eq!(labels(temp.path()).len(), 2);
}

#[test]
fn test_order_is_deterministic() {
    let temp = TempDir::new().unwrap();
    for name in ["zeta.test.js", "alpha.spec.js", "mid/beta.test.js", "Mid.test.js"] {
        touch(temp.path(), name);
    }

    let first = labels(temp.path());
    let second = labels(temp.path());
    assert_eq!(first, second);

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted);
}

#[test]
fn test_custom_suffixes() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "a_spec.js");
    touch(temp.path(), "b.test.js");

    let result = discover_with_suffixes(temp.path(), &["_spec.js".to_string()]);
    assert_eq!(result.file_count(), 1);
    assert_eq!(result.files[0].label, "a_spec.js");
}

#[cfg(unix)]
#[test]
fn test_unreadable_subtree_does_not_fail_discovery() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    touch(temp.path(), "ok.test.js");
    touch(temp.path(), "locked/hidden.test.js");
    let locked = temp.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let result = discover(temp.path());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(result.files.iter().any(|f| f.label == "ok.test.js"));
    // Running as root can still read the directory
    assert!(result.file_count() == 1 || result.file_count() == 2);
}
