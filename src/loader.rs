//! Script Loader: the fixed-order bootstrap pipeline
//!
//! Bootstrap scripts are compiled into the binary and evaluated, in order,
//! into a fresh `ExecutionScope`. Test files are then evaluated into the same
//! scope in discovery order, and finally the runner script that defines the
//! framework's execution entry point.
//!
//! The order below is a contract with the bundled framework:
//! 1. `predef.js`  - host shims and `require`
//! 2. `jasmine.js` - the framework core
//! 3. `console.js` - console shim
//! 4. `boot.js`    - publishes `describe`/`it`/`expect` as globals

use crate::discovery::TestFile;
use crate::environment::{ExecutionScope, LoadError, ScriptSource};

/// A script compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct BundledScript {
    pub name: &'static str,
    pub text: &'static str,
}

impl BundledScript {
    pub fn source(&self) -> ScriptSource {
        ScriptSource::bundled(self.name, self.text)
    }
}

pub const BOOTSTRAP_SCRIPTS: [BundledScript; 4] = [
    BundledScript {
        name: "predef.js",
        text: include_str!("js/predef.js"),
    },
    BundledScript {
        name: "jasmine.js",
        text: include_str!("js/jasmine.js"),
    },
    BundledScript {
        name: "console.js",
        text: include_str!("js/console.js"),
    },
    BundledScript {
        name: "boot.js",
        text: include_str!("js/boot.js"),
    },
];

/// Evaluated after the test files; defines `executeTests(listener)`
pub const RUNNER_SCRIPT: BundledScript = BundledScript {
    name: "runner.js",
    text: include_str!("js/runner.js"),
};

/// Name of the global the framework reads to tag specs with their file
pub const SPEC_FILE_GLOBAL: &str = "__specFile";

/// Evaluate the bootstrap scripts into `scope`, in order.
pub fn bootstrap(scope: &mut ExecutionScope) -> Result<(), LoadError> {
    for script in &BOOTSTRAP_SCRIPTS {
        tracing::debug!(script = script.name, "loading bootstrap script");
        scope.evaluate(&script.source())?;
    }
    Ok(())
}

/// Evaluate each test file into `scope`, in the order given.
///
/// Returns the number of files loaded. Stops at the first failure.
pub fn load_test_files(scope: &mut ExecutionScope, files: &[TestFile]) -> Result<usize, LoadError> {
    for file in files {
        tracing::debug!(file = %file.label, "loading test file");

        let source = ScriptSource::from_file(file.label.clone(), &file.path).map_err(|e| LoadError {
            script: file.label.clone(),
            line: None,
            message: format!("could not read {}: {}", file.path.display(), e),
        })?;

        scope.set_global(SPEC_FILE_GLOBAL, &file.label)?;
        scope.evaluate(&source)?;
    }
    scope.set_global(SPEC_FILE_GLOBAL, "")?;
    Ok(files.len())
}

/// Evaluate the runner script that defines the execution entry point.
pub fn load_runner(scope: &mut ExecutionScope) -> Result<(), LoadError> {
    scope.evaluate(&RUNNER_SCRIPT.source()).map(|_| ())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ModuleResolver;
    use std::collections::BTreeMap;

    fn bootstrapped() -> ExecutionScope {
        let mut scope = ExecutionScope::new(ModuleResolver::default(), &BTreeMap::new()).unwrap();
        bootstrap(&mut scope).expect("bundled scripts should evaluate cleanly");
        scope
    }

    #[test]
    fn test_bootstrap_order_is_fixed() {
        let names: Vec<_> = BOOTSTRAP_SCRIPTS.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["predef.js", "jasmine.js", "console.js", "boot.js"]);
    }

    #[test]
    fn test_bootstrap_publishes_globals() {
        let mut scope = bootstrapped();
        let value = scope
            .evaluate(&ScriptSource::bundled(
                "snippet.js",
                "[typeof describe, typeof it, typeof expect, typeof require, typeof console.log].join(',')",
            ))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("function,function,function,function,function".to_string())
        );
    }

    #[test]
    fn test_runner_script_defines_entry_point() {
        let mut scope = bootstrapped();
        load_runner(&mut scope).unwrap();
        let value = scope
            .evaluate(&ScriptSource::bundled("snippet.js", "typeof executeTests"))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("function".to_string())
        );
    }

    #[test]
    fn test_missing_test_file_is_load_error() {
        let mut scope = bootstrapped();
        let files = vec![TestFile {
            path: "/definitely/not/here.test.js".into(),
            label: "here.test.js".to_string(),
        }];
        let err = load_test_files(&mut scope, &files).unwrap_err();
        assert_eq!(err.script, "here.test.js");
        assert!(err.message.contains("could not read"));
    }
}
