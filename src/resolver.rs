//! Module Resolution
//!
//! Maps the id passed to `require(...)` onto a file under one of the
//! configured source roots. Roots are searched in order and the first match
//! wins. Every resolved path must lie under one of the roots; ids that
//! escape them, absolute or through `..`, do not resolve.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Error returned when a module id matches nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub id: String,
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot find module '{}'", self.id)?;
        if !self.searched.is_empty() {
            let roots: Vec<String> = self
                .searched
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            write!(f, " (searched: {})", roots.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}

/// Resolves module ids against an ordered list of source roots
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    roots: Vec<PathBuf>,
    /// Canonical form of `roots`, used for the containment check
    canonical_roots: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let canonical_roots = roots.iter().map(|r| normalize(r)).collect();
        Self {
            roots,
            canonical_roots,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `id` as required from a module living in `base_dir`.
    ///
    /// `base_dir` is `None` for requires issued by test files and bootstrap
    /// scripts; relative ids then fall back to the source roots.
    pub fn resolve(&self, id: &str, base_dir: Option<&Path>) -> Result<PathBuf, ResolutionError> {
        let id_path = Path::new(id);
        let not_found = |searched: Vec<PathBuf>| ResolutionError {
            id: id.to_string(),
            searched,
        };

        if id_path.is_absolute() {
            return find_candidate(id_path)
                .filter(|p| self.contains(p))
                .ok_or_else(|| not_found(self.roots.clone()));
        }

        if is_relative_id(id) {
            if let Some(base) = base_dir {
                return find_candidate(&base.join(id_path))
                    .filter(|p| self.contains(p))
                    .ok_or_else(|| not_found(vec![base.to_path_buf()]));
            }
        }

        for root in &self.roots {
            if let Some(found) = find_candidate(&root.join(id_path)).filter(|p| self.contains(p)) {
                tracing::trace!(id, path = %found.display(), "resolved module");
                return Ok(found);
            }
        }

        Err(not_found(self.roots.clone()))
    }

    /// Is the normalized `path` inside one of the source roots?
    fn contains(&self, path: &Path) -> bool {
        let inside = self.canonical_roots.iter().any(|root| path.starts_with(root));
        if !inside {
            tracing::debug!(path = %path.display(), "module outside every source root");
        }
        inside
    }
}

fn is_relative_id(id: &str) -> bool {
    id.starts_with("./") || id.starts_with("../") || id == "." || id == ".."
}

/// Try `<p>.js`, then `<p>`, then `<p>/index.js`.
fn find_candidate(candidate: &Path) -> Option<PathBuf> {
    let mut with_ext = candidate.as_os_str().to_owned();
    with_ext.push(".js");

    [
        PathBuf::from(with_ext),
        candidate.to_path_buf(),
        candidate.join("index.js"),
    ]
    .into_iter()
    .find(|p| p.is_file())
    .map(|p| normalize(&p))
}

/// Canonicalize when possible so the module cache keys are stable,
/// otherwise fold `.`/`..` lexically.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
