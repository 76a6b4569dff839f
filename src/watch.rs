//! Watch Mode: re-run specs when scripts change
//!
//! Every run starts from a fresh `ExecutionScope`, so edited test files and
//! modules are always re-read from disk; nothing is carried over between runs.

use crate::signals::shutdown_requested;
use anyhow::Result;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quiet period that ends a burst of file events
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the idle loop checks for a shutdown signal
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Clear terminal screen (ANSI escape codes)
pub fn clear_screen() {
    use std::io::Write;
    print!("\x1B[2J\x1B[1;1H");
    let _ = std::io::stdout().flush();
}

/// Run once, then again after every change, until a shutdown signal arrives.
///
/// `roots` are watched recursively; roots that do not exist are skipped.
/// `run_session` performs one complete run.
pub fn start_watch_loop<F>(roots: &[PathBuf], mut run_session: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let (tx, rx) = unbounded();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        Config::default(),
    )?;

    let mut watched = 0;
    for root in roots {
        if !root.is_dir() {
            tracing::warn!(path = %root.display(), "not a directory, not watching");
            continue;
        }
        watcher.watch(root, RecursiveMode::Recursive)?;
        eprintln!("[jasmine-runner] Watching for changes in {}", root.display());
        watched += 1;
    }
    if watched == 0 {
        anyhow::bail!("no existing directories to watch");
    }
    eprintln!("[jasmine-runner] Press Ctrl+C to stop.\n");

    if let Err(e) = run_session() {
        eprintln!("[jasmine-runner] Initial run failed: {:#}", e);
    }

    while !shutdown_requested() {
        let first_event = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            // Watcher dropped
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut changed = collect_script_paths(&first_event);
        while let Ok(event) = rx.recv_timeout(DEBOUNCE) {
            changed.extend(collect_script_paths(&event));
        }
        if changed.is_empty() || shutdown_requested() {
            continue;
        }
        changed.sort();
        changed.dedup();

        clear_screen();
        tracing::debug!(files = ?changed, "change detected");
        eprintln!(
            "[jasmine-runner] Change detected in {} file(s). Re-running...\n",
            changed.len()
        );

        if let Err(e) = run_session() {
            eprintln!("[jasmine-runner] Run failed: {:#}", e);
        }
    }

    Ok(())
}

/// Script paths from a notify event that should trigger a re-run
pub fn collect_script_paths(event: &Event) -> Vec<PathBuf> {
    event
        .paths
        .iter()
        .filter(|p| p.extension() == Some(OsStr::new("js")))
        .filter(|p| !is_ignored_path(p))
        .cloned()
        .collect()
}

/// Dependency and VCS directories never trigger a re-run
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str();
        name == "node_modules" || name == ".git"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind};

    fn modify_event(paths: &[&str]) -> Event {
        Event {
            kind: notify::EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_is_ignored_path() {
        assert!(is_ignored_path(Path::new("project/node_modules/lodash/index.js")));
        assert!(is_ignored_path(Path::new(".git/hooks/pre-commit.js")));
        assert!(!is_ignored_path(Path::new("tests/users.test.js")));
        assert!(!is_ignored_path(Path::new("scripts/lib/helpers.js")));
    }

    #[test]
    fn test_ignored_match_is_by_component() {
        assert!(!is_ignored_path(Path::new("src/my_node_modules_helper.js")));
        assert!(!is_ignored_path(Path::new("src/.github/workflow.js")));
    }

    #[test]
    fn test_collect_script_paths_filters_non_js() {
        let event = modify_event(&["a.test.js", "notes.txt", "lib.rs", "helpers.js"]);
        let paths = collect_script_paths(&event);
        assert_eq!(paths, vec![PathBuf::from("a.test.js"), PathBuf::from("helpers.js")]);
    }

    #[test]
    fn test_collect_script_paths_filters_ignored() {
        let event = modify_event(&["tests/good.spec.js", "node_modules/dep/index.js"]);
        let paths = collect_script_paths(&event);
        assert_eq!(paths, vec![PathBuf::from("tests/good.spec.js")]);
    }

    #[test]
    fn test_watch_requires_existing_directory() {
        let result = start_watch_loop(&[PathBuf::from("/definitely/not/a/dir")], || Ok(()));
        assert!(result.is_err());
    }
}
