//! Runner: INIT → DISCOVER → BOOTSTRAP → LOAD → EXECUTE → EXIT
//!
//! One call to [`run`] is one complete run: a fresh `ExecutionScope`, the
//! bundled framework, every discovered test file, then the framework's
//! `executeTests` entry point driving a [`ResultListener`].
//!
//! Any error before EXECUTE aborts the run and no summary is produced.
//! Spec failures during EXECUTE are results, not errors.

use crate::discovery::{default_suffixes, discover_with_suffixes};
use crate::environment::{ExecutionScope, LoadError};
use crate::loader;
use crate::protocol::{DonePayload, SpecPayload, StartedPayload, SuitePayload};
use crate::reporter::{ResultListener, RunSummary, Status};
use crate::resolver::ModuleResolver;
use boa_engine::object::ObjectInitializer;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsValue, NativeFunction};
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
pub const EXIT_ABORTED: i32 = 2;

/// Listener shared between the host and the framework callbacks
pub type SharedListener = Rc<RefCell<dyn ResultListener>>;

/// Everything one run needs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub test_root: PathBuf,
    /// Ordered; the first root that resolves a module wins
    pub source_roots: Vec<PathBuf>,
    pub suffixes: Vec<String>,
    /// Overlaid on the host environment as `process.env`
    pub env: BTreeMap<String, String>,
}

impl RunOptions {
    pub fn new(test_root: impl Into<PathBuf>) -> Self {
        Self {
            test_root: test_root.into(),
            source_roots: Vec::new(),
            suffixes: default_suffixes(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Pipeline stage, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Discover,
    Bootstrap,
    Load,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Discover => "discover",
            Stage::Bootstrap => "bootstrap",
            Stage::Load => "load",
            Stage::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// A run that ended without a summary
#[derive(Debug)]
pub enum RunError {
    /// A script failed to evaluate before execution began
    Load { stage: Stage, error: LoadError },
    /// The framework failed while executing specs
    Execute(LoadError),
}

impl RunError {
    pub fn stage(&self) -> Stage {
        match self {
            RunError::Load { stage, .. } => *stage,
            RunError::Execute(_) => Stage::Execute,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Load { stage, error } => write!(f, "{} failed: {}", stage, error),
            RunError::Execute(error) => write!(f, "execution failed: {}", error),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Load { error, .. } | RunError::Execute(error) => Some(error),
        }
    }
}

/// Map the outcome of a run to a process exit code.
pub fn exit_code(outcome: &Result<RunSummary, RunError>) -> i32 {
    match outcome {
        Ok(summary) if summary.success() => EXIT_SUCCESS,
        Ok(_) => EXIT_FAILURES,
        Err(_) => EXIT_ABORTED,
    }
}

// =============================================================================
// Listener Bridge
// =============================================================================

/// Receives the framework's reporter callbacks and forwards them to the listener.
///
/// Keeps its own tally so the exit code never depends on what a listener does.
struct ListenerBridge {
    listener: SharedListener,
    summary: RefCell<RunSummary>,
    finished: Cell<bool>,
    started: Instant,
}

impl ListenerBridge {
    fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            summary: RefCell::new(RunSummary::default()),
            finished: Cell::new(false),
            started: Instant::now(),
        }
    }

    fn jasmine_started(&self, payload: StartedPayload) {
        tracing::debug!(total = payload.total_specs_defined, "execution started");
        self.listener.borrow_mut().on_run_start(payload.total_specs_defined);
    }

    fn spec_done(&self, payload: SpecPayload) {
        let event = payload.into_event();
        self.summary.borrow_mut().record(&event);

        let mut listener = self.listener.borrow_mut();
        match event.status {
            Status::Passed => listener.on_spec_passed(&event),
            Status::Failed | Status::Error => listener.on_spec_failed(&event),
            Status::Skipped => listener.on_spec_skipped(&event),
        }
    }

    fn suite_done(&self, payload: SuitePayload) {
        self.summary.borrow_mut().errors.extend(payload.errors());
    }

    fn jasmine_done(&self, payload: DonePayload) {
        let mut summary = self.summary.borrow_mut();
        // Top-level afterAll failures belong to no suite
        summary
            .errors
            .extend(payload.failed_expectations.into_iter().map(|e| e.message));
        summary.duration_ms = self.started.elapsed().as_millis() as u64;

        tracing::debug!(
            overall = %payload.overall_status,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "execution finished"
        );
        self.finished.set(true);
        self.listener.borrow_mut().on_run_finished(&summary);
    }

    fn finish(&self) -> Option<RunSummary> {
        self.finished.get().then(|| self.summary.borrow().clone())
    }
}

fn parse_payload<T: DeserializeOwned>(args: &[JsValue], ctx: &mut Context) -> JsResult<T> {
    let text = args
        .first()
        .cloned()
        .unwrap_or_else(JsValue::undefined)
        .to_string(ctx)?
        .to_std_string_escaped();
    serde_json::from_str(&text).map_err(|e| {
        JsNativeError::typ()
            .with_message(format!("malformed reporter payload: {}", e))
            .into()
    })
}

/// Wrap a bridge method as a native function taking one JSON argument.
fn bridge_fn<T, F>(bridge: &Rc<ListenerBridge>, method: F) -> NativeFunction
where
    T: DeserializeOwned + 'static,
    F: Fn(&ListenerBridge, T) + 'static,
{
    let bridge = Rc::clone(bridge);
    // SAFETY: the closure captures only an `Rc<ListenerBridge>` and a plain
    // function; neither holds garbage-collected values that would need tracing.
    unsafe {
        NativeFunction::from_closure(move |_this, args, ctx| {
            let payload = parse_payload::<T>(args, ctx)?;
            method(&*bridge, payload);
            Ok(JsValue::undefined())
        })
    }
}

fn listener_object(bridge: &Rc<ListenerBridge>, ctx: &mut Context) -> JsValue {
    let object = ObjectInitializer::new(ctx)
        .function(
            bridge_fn(bridge, ListenerBridge::jasmine_started),
            js_string!("jasmineStarted"),
            1,
        )
        .function(bridge_fn(bridge, ListenerBridge::spec_done), js_string!("specDone"), 1)
        .function(bridge_fn(bridge, ListenerBridge::suite_done), js_string!("suiteDone"), 1)
        .function(
            bridge_fn(bridge, ListenerBridge::jasmine_done),
            js_string!("jasmineDone"),
            1,
        )
        .build();
    object.into()
}

// =============================================================================
// Pipeline
// =============================================================================

/// Execute one complete run.
///
/// Returns the summary when execution completed, whatever the spec outcomes.
pub fn run(options: &RunOptions, listener: SharedListener) -> Result<RunSummary, RunError> {
    // INIT
    let resolver = ModuleResolver::new(options.source_roots.clone());
    let mut scope = ExecutionScope::new(resolver, &options.env).map_err(|error| RunError::Load {
        stage: Stage::Init,
        error,
    })?;

    // DISCOVER
    let discovered = discover_with_suffixes(&options.test_root, &options.suffixes);
    for path in &discovered.unreadable {
        tracing::warn!(path = %path.display(), "skipped unreadable directory entry");
    }
    tracing::debug!(
        root = %options.test_root.display(),
        files = discovered.file_count(),
        "discovered test files"
    );

    // BOOTSTRAP
    loader::bootstrap(&mut scope).map_err(|error| RunError::Load {
        stage: Stage::Bootstrap,
        error,
    })?;

    // LOAD
    loader::load_test_files(&mut scope, &discovered.files)
        .and_then(|_| loader::load_runner(&mut scope))
        .map_err(|error| RunError::Load {
            stage: Stage::Load,
            error,
        })?;

    // EXECUTE
    let bridge = Rc::new(ListenerBridge::new(listener));
    let listener_value = listener_object(&bridge, scope.context_mut());
    scope
        .call_global("executeTests", &[listener_value])
        .map_err(RunError::Execute)?;

    // EXIT
    bridge.finish().ok_or_else(|| {
        RunError::Execute(LoadError {
            script: loader::RUNNER_SCRIPT.name.to_string(),
            line: None,
            message: "framework did not report completion".to_string(),
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ResultEvent;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        started: Option<usize>,
        events: Vec<(String, Status)>,
        finished: Option<RunSummary>,
    }

    impl ResultListener for Recorder {
        fn on_run_start(&mut self, total: usize) {
            self.started = Some(total);
        }
        fn on_spec_passed(&mut self, event: &ResultEvent) {
            self.events.push((event.name.clone(), event.status));
        }
        fn on_spec_failed(&mut self, event: &ResultEvent) {
            self.events.push((event.name.clone(), event.status));
        }
        fn on_spec_skipped(&mut self, event: &ResultEvent) {
            self.events.push((event.name.clone(), event.status));
        }
        fn on_run_finished(&mut self, summary: &RunSummary) {
            self.finished = Some(summary.clone());
        }
    }

    fn run_files(files: &[(&str, &str)]) -> (Result<RunSummary, RunError>, Rc<RefCell<Recorder>>) {
        let temp = TempDir::new().unwrap();
        for (name, body) in files {
            let path = temp.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let outcome = run(&RunOptions::new(temp.path()), recorder.clone());
        (outcome, recorder)
    }

    #[test]
    fn test_exit_code_mapping() {
        let passing = RunSummary {
            passed: 3,
            ..Default::default()
        };
        let failing = RunSummary {
            passed: 2,
            failed: 1,
            ..Default::default()
        };
        let suite_error = RunSummary {
            passed: 1,
            errors: vec!["db: boom".to_string()],
            ..Default::default()
        };
        let aborted = RunError::Execute(LoadError {
            script: "x.js".to_string(),
            line: None,
            message: "boom".to_string(),
        });

        assert_eq!(exit_code(&Ok(passing)), EXIT_SUCCESS);
        assert_eq!(exit_code(&Ok(failing)), EXIT_FAILURES);
        assert_eq!(exit_code(&Ok(suite_error)), EXIT_FAILURES);
        assert_eq!(exit_code(&Err(aborted)), EXIT_ABORTED);
    }

    #[test]
    fn test_empty_root_is_successful_run() {
        let (outcome, recorder) = run_files(&[]);
        let summary = outcome.unwrap();
        assert_eq!(summary.total(), 0);
        assert!(summary.success());
        assert_eq!(recorder.borrow().started, Some(0));
        assert!(recorder.borrow().finished.is_some());
    }

    #[test]
    fn test_events_arrive_in_declaration_order() {
        let (outcome, recorder) = run_files(&[(
            "order.test.js",
            r#"
describe('order', function () {
    it('first', function () { expect(1).toBe(1); });
    it('second', function () { expect(1).toBe(2); });
    xit('third', function () {});
});
"#,
        )]);
        let summary = outcome.unwrap();
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));

        let recorder = recorder.borrow();
        assert_eq!(
            recorder.events,
            vec![
                ("order first".to_string(), Status::Passed),
                ("order second".to_string(), Status::Failed),
                ("order third".to_string(), Status::Skipped),
            ]
        );
        assert_eq!(recorder.started, Some(3));
    }

    #[test]
    fn test_thrown_error_reported_as_error() {
        let (outcome, recorder) = run_files(&[(
            "throws.spec.js",
            "describe('t', function () { it('throws', function () { undefinedFn(); }); });",
        )]);
        assert_eq!(outcome.unwrap().failed, 1);
        assert_eq!(recorder.borrow().events[0].1, Status::Error);
    }

    #[test]
    fn test_after_all_failure_is_suite_error() {
        let (outcome, _) = run_files(&[(
            "teardown.test.js",
            r#"
describe('db', function () {
    afterAll(function () { throw new Error('teardown'); });
    it('works', function () { expect(true).toBe(true); });
});
"#,
        )]);
        let summary = outcome.unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("db: "), "{:?}", summary.errors);
        assert!(!summary.success());
    }

    #[test]
    fn test_load_error_aborts_without_summary() {
        let (outcome, recorder) = run_files(&[
            ("a.test.js", "describe('a', function () { it('ok', function () {}); });"),
            ("b.test.js", "describe('b', function () {\n  it('x', function ( {\n});"),
        ]);
        let err = outcome.unwrap_err();
        assert_eq!(err.stage(), Stage::Load);
        match &err {
            RunError::Load { error, .. } => assert_eq!(error.script, "b.test.js"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(recorder.borrow().started.is_none());
        assert!(recorder.borrow().finished.is_none());
    }

    #[test]
    fn test_single_file_test_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("only.test.js");
        fs::write(
            &file,
            "describe('only', function () { it('runs', function () { expect(1).toBe(1); }); });",
        )
        .unwrap();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let summary = run(&RunOptions::new(&file), recorder.clone()).unwrap();
        assert_eq!((summary.passed, summary.total()), (1, 1));
        assert_eq!(recorder.borrow().events[0].0, "only runs");

        let other = temp.path().join("notes.js");
        fs::write(&other, "throw new Error('never loaded');").unwrap();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let summary = run(&RunOptions::new(&other), recorder).unwrap();
        assert_eq!(summary.total(), 0);
        assert!(summary.success());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Bootstrap.to_string(), "bootstrap");
        assert_eq!(Stage::Execute.to_string(), "execute");
    }
}
