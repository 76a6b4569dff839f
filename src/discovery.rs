//! Test File Discovery
//!
//! Recursively walks the test root and collects every file whose name ends
//! with one of the test suffixes. Results are sorted lexically so runs are
//! reproducible regardless of the platform's directory listing order.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Unit-test naming convention
pub const TEST_SUFFIX: &str = ".test.js";
/// Spec naming convention
pub const SPEC_SUFFIX: &str = ".spec.js";

/// The default suffixes, in the order they are documented
pub fn default_suffixes() -> Vec<String> {
    vec![TEST_SUFFIX.to_string(), SPEC_SUFFIX.to_string()]
}

/// A discovered test file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestFile {
    /// Full path on disk
    pub path: PathBuf,
    /// Path relative to the test root, used as the script label
    pub label: String,
}

/// Result of scanning a test root
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub files: Vec<TestFile>,
    /// Directories that could not be listed (recovered as empty)
    pub unreadable: Vec<PathBuf>,
}

impl DiscoveryResult {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Does `name` match one of the test suffixes?
pub fn is_test_file_name(name: &str, suffixes: &[String]) -> bool {
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}

/// Discover test files under `root` using the default suffixes.
pub fn discover(root: &Path) -> DiscoveryResult {
    discover_with_suffixes(root, &default_suffixes())
}

/// Discover test files under `root`.
///
/// Never fails: a missing root yields an empty result, and directories that
/// cannot be read are recorded in `unreadable` and otherwise skipped.
pub fn discover_with_suffixes(root: &Path, suffixes: &[String]) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                tracing::debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                // The root itself not existing is just "no tests"
                if path != root {
                    result.unreadable.push(path);
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !is_test_file_name(&name, suffixes) {
            continue;
        }

        let label = match entry.path().strip_prefix(root) {
            // A single-file root is labelled by its own name
            Ok(rel) if rel.as_os_str().is_empty() => name.into_owned(),
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => entry.path().to_string_lossy().replace('\\', "/"),
        };
        let path = entry.into_path();
        result.files.push(TestFile { path, label });
    }

    // sort_by_file_name orders siblings; a full-path sort keeps ordering stable
    // when a single-file root is passed in as well.
    result.files.sort();

    tracing::debug!(
        root = %root.display(),
        count = result.files.len(),
        "discovery complete"
    );
    result
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_suffix_matching() {
        let suffixes = default_suffixes();
        assert!(is_test_file_name("foo.test.js", &suffixes));
        assert!(is_test_file_name("bar.spec.js", &suffixes));
        assert!(!is_test_file_name("foo.js", &suffixes));
        assert!(!is_test_file_name("test.js", &suffixes));
        assert!(!is_test_file_name("foo.test.js.bak", &suffixes));
    }

    #[test]
    fn test_custom_suffixes() {
        let suffixes = vec!["_spec.js".to_string()];
        assert!(is_test_file_name("users_spec.js", &suffixes));
        assert!(!is_test_file_name("users.spec.js", &suffixes));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let result = discover(&temp.path().join("does-not-exist"));
        assert!(result.is_empty());
        assert!(result.unreadable.is_empty());
    }

    #[test]
    fn test_labels_are_root_relative() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("nested/deeper")).unwrap();
        fs::write(temp.path().join("nested/deeper/a.test.js"), "").unwrap();

        let result = discover(temp.path());
        assert_eq!(result.file_count(), 1);
        assert_eq!(result.files[0].label, "nested/deeper/a.test.js");
    }

    #[test]
    fn test_lexical_order() {
        let temp = TempDir::new().unwrap();
        for name in ["c.test.js", "a.spec.js", "b.test.js"] {
            fs::write(temp.path().join(name), "").unwrap();
        }

        let labels: Vec<_> = discover(temp.path())
            .files
            .into_iter()
            .map(|f| f.label)
            .collect();
        assert_eq!(labels, vec!["a.spec.js", "b.test.js", "c.test.js"]);
    }

    #[test]
    fn test_single_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("lone.spec.js");
        fs::write(&file, "").unwrap();
        fs::write(temp.path().join("helper.js"), "").unwrap();

        let result = discover(&file);
        assert_eq!(result.file_count(), 1);
        assert_eq!(result.files[0].label, "lone.spec.js");
        assert_eq!(result.files[0].path, file);

        assert!(discover(&temp.path().join("helper.js")).is_empty());
    }
}
