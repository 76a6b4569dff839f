//! Reporter Module: the Result Listener contract and its Human/JSON outputs
//!
//! ## Architecture
//!
//! - `ResultListener` trait defines the callbacks the framework drives
//! - `ConsoleReporter` writes a human-readable report (stdout by default)
//! - `JsonReporter` writes NDJSON events (for --format=json)
//! - `MultiReporter` fans events out to several listeners
//!
//! When `JsonReporter` is active it is the only writer to stdout.
//! Diagnostics go to stderr.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

/// Outcome of a single spec
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    /// The spec threw instead of failing an expectation
    Error,
    /// Pending, disabled with `xit`/`xdescribe`, or excluded by focus
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "pass",
            Status::Failed => "fail",
            Status::Error => "error",
            Status::Skipped => "skip",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Error)
    }
}

/// One spec outcome as reported by the framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    /// Full spec name: enclosing suite descriptions plus the spec's own
    pub name: String,
    /// Root-relative test file that declared the spec
    pub file: String,
    pub status: Status,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Aggregate counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failures outside any spec (`afterAll`, suite-level errors)
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn success(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }

    pub fn record(&mut self, event: &ResultEvent) {
        match event.status {
            Status::Passed => self.passed += 1,
            Status::Failed | Status::Error => self.failed += 1,
            Status::Skipped => self.skipped += 1,
        }
    }
}

/// Callbacks invoked by the framework while a run executes.
///
/// Events arrive in spec execution order. Any callback may be invoked zero
/// or many times.
pub trait ResultListener {
    /// Called once before any spec runs, with the number of specs declared
    fn on_run_start(&mut self, _total: usize) {}

    fn on_spec_passed(&mut self, event: &ResultEvent);

    /// Called for both `Failed` and `Error` outcomes
    fn on_spec_failed(&mut self, event: &ResultEvent);

    fn on_spec_skipped(&mut self, _event: &ResultEvent) {}

    fn on_run_finished(&mut self, summary: &RunSummary);

    /// Fatal diagnostics for an aborted run
    fn on_error(&mut self, _message: &str) {}
}

// =============================================================================
// ConsoleReporter
// =============================================================================

/// Human Reporter - readable per-spec lines plus a failure digest
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
    color: bool,
    failures: Vec<ResultEvent>,
}

impl ConsoleReporter {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            failures: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, status: Status) -> String {
        if !self.color {
            return text.to_string();
        }
        match status {
            Status::Passed => text.green().to_string(),
            Status::Failed | Status::Error => text.red().to_string(),
            Status::Skipped => text.yellow().to_string(),
        }
    }

    fn spec_line(&mut self, icon: &str, event: &ResultEvent) {
        let icon = self.paint(icon, event.status);
        let _ = writeln!(self.out, "  {} {} ({}ms)", icon, event.name, event.duration_ms);
    }
}

impl<W: Write> ResultListener for ConsoleReporter<W> {
    fn on_run_start(&mut self, total: usize) {
        self.failures.clear();
        let _ = writeln!(self.out, "Running {} specs\n", total);
    }

    fn on_spec_passed(&mut self, event: &ResultEvent) {
        self.spec_line("✓", event);
    }

    fn on_spec_failed(&mut self, event: &ResultEvent) {
        self.spec_line("✗", event);
        self.failures.push(event.clone());
    }

    fn on_spec_skipped(&mut self, event: &ResultEvent) {
        let icon = self.paint("○", event.status);
        let _ = writeln!(self.out, "  {} {} (skipped)", icon, event.name);
    }

    fn on_run_finished(&mut self, summary: &RunSummary) {
        let failures = std::mem::take(&mut self.failures);
        if !failures.is_empty() {
            let _ = writeln!(self.out, "\nFailures:");
            for (i, failure) in failures.iter().enumerate() {
                let _ = writeln!(self.out, "{}) {}", i + 1, failure.name);
                if !failure.file.is_empty() {
                    let _ = writeln!(self.out, "    in {}", failure.file);
                }
                if let Some(msg) = &failure.message {
                    for line in msg.lines().take(20) {
                        let _ = writeln!(self.out, "    {}", line);
                    }
                }
            }
        }

        if !summary.errors.is_empty() {
            let _ = writeln!(self.out, "\nSuite errors:");
            for error in &summary.errors {
                let _ = writeln!(self.out, "  {}", error);
            }
        }

        let status = if summary.success() {
            Status::Passed
        } else {
            Status::Failed
        };
        let line = format!(
            "{} specs, {} passed, {} failed, {} skipped in {}ms",
            summary.total(),
            summary.passed,
            summary.failed,
            summary.skipped,
            summary.duration_ms
        );
        let line = self.paint(&line, status);
        let _ = writeln!(self.out, "\n{}", line);
        let _ = self.out.flush();
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[jasmine-runner] FATAL ERROR: {}", message);
    }
}

// =============================================================================
// JsonReporter
// =============================================================================

/// Machine-readable events for JSON output
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    /// Emitted at start of test run
    RunStart { count: usize },
    /// Emitted when a spec completes
    TestFinished {
        id: &'a str,
        file: &'a str,
        status: &'a str,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
    /// Emitted at end of test run
    RunFinished {
        passed: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
        #[serde(skip_serializing_if = "no_errors")]
        errors: &'a [String],
    },
    /// Emitted on fatal error
    Error { message: &'a str },
}

fn no_errors(errors: &&[String]) -> bool {
    errors.is_empty()
}

/// JSON Reporter - outputs NDJSON
pub struct JsonReporter<W: Write = io::Stdout> {
    out: W,
}

impl JsonReporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &MachineEvent<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let _ = writeln!(self.out, "{}", line);
                let _ = self.out.flush();
            }
            Err(e) => eprintln!("[jasmine-runner] Failed to serialize event: {}", e),
        }
    }

    fn finished(&mut self, event: &ResultEvent) {
        self.emit(&MachineEvent::TestFinished {
            id: &event.name,
            file: &event.file,
            status: event.status.as_str(),
            duration_ms: event.duration_ms,
            message: event.message.as_deref(),
        });
    }
}

impl<W: Write> ResultListener for JsonReporter<W> {
    fn on_run_start(&mut self, total: usize) {
        self.emit(&MachineEvent::RunStart { count: total });
    }

    fn on_spec_passed(&mut self, event: &ResultEvent) {
        self.finished(event);
    }

    fn on_spec_failed(&mut self, event: &ResultEvent) {
        self.finished(event);
    }

    fn on_spec_skipped(&mut self, event: &ResultEvent) {
        self.finished(event);
    }

    fn on_run_finished(&mut self, summary: &RunSummary) {
        self.emit(&MachineEvent::RunFinished {
            passed: summary.passed,
            failed: summary.failed,
            skipped: summary.skipped,
            duration_ms: summary.duration_ms,
            errors: &summary.errors,
        });
    }

    fn on_error(&mut self, message: &str) {
        self.emit(&MachineEvent::Error { message });
    }
}

// =============================================================================
// MultiReporter
// =============================================================================

/// MultiReporter - broadcasts events to multiple listeners
pub struct MultiReporter {
    reporters: Vec<Box<dyn ResultListener>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn ResultListener>>) -> Self {
        Self { reporters }
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ResultListener for MultiReporter {
    fn on_run_start(&mut self, total: usize) {
        for r in &mut self.reporters {
            r.on_run_start(total);
        }
    }

    fn on_spec_passed(&mut self, event: &ResultEvent) {
        for r in &mut self.reporters {
            r.on_spec_passed(event);
        }
    }

    fn on_spec_failed(&mut self, event: &ResultEvent) {
        for r in &mut self.reporters {
            r.on_spec_failed(event);
        }
    }

    fn on_spec_skipped(&mut self, event: &ResultEvent) {
        for r in &mut self.reporters {
            r.on_spec_skipped(event);
        }
    }

    fn on_run_finished(&mut self, summary: &RunSummary) {
        for r in &mut self.reporters {
            r.on_run_finished(summary);
        }
    }

    fn on_error(&mut self, message: &str) {
        for r in &mut self.reporters {
            r.on_error(message);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, status: Status, message: Option<&str>) -> ResultEvent {
        ResultEvent {
            name: name.to_string(),
            file: "math.test.js".to_string(),
            status,
            message: message.map(str::to_string),
            duration_ms: 3,
        }
    }

    #[test]
    fn test_summary_counts_and_success() {
        let mut summary = RunSummary::default();
        assert!(summary.success());

        summary.record(&event("a", Status::Passed, None));
        summary.record(&event("b", Status::Skipped, None));
        assert!(summary.success());
        assert_eq!(summary.total(), 2);

        summary.record(&event("c", Status::Error, Some("TypeError: boom")));
        assert_eq!(summary.failed, 1);
        assert!(!summary.success());
    }

    #[test]
    fn test_suite_errors_fail_the_run() {
        let summary = RunSummary {
            passed: 3,
            errors: vec!["afterAll: Error: cleanup".to_string()],
            ..Default::default()
        };
        assert!(!summary.success());
    }

    #[test]
    fn test_json_event_serialization() {
        let event = MachineEvent::TestFinished {
            id: "math adds",
            file: "math.test.js",
            status: "pass",
            duration_ms: 42,
            message: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"test_finished\""));
        assert!(json.contains("\"id\":\"math adds\""));
        assert!(json.contains("\"status\":\"pass\""));
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_json_run_finished_omits_empty_errors() {
        let errors: Vec<String> = vec![];
        let event = MachineEvent::RunFinished {
            passed: 1,
            failed: 0,
            skipped: 0,
            duration_ms: 5,
            errors: &errors,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"run_finished\""));
        assert!(!json.contains("errors"));
    }

    #[test]
    fn test_json_reporter_writes_ndjson() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.on_run_start(2);
        reporter.on_spec_passed(&event("a", Status::Passed, None));
        reporter.on_spec_failed(&event("b", Status::Failed, Some("Expected 1 to be 2.")));
        reporter.on_run_finished(&RunSummary {
            passed: 1,
            failed: 1,
            ..Default::default()
        });

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).expect("each line is JSON");
        }
        assert!(lines[2].contains("Expected 1 to be 2."));
    }

    #[test]
    fn test_console_reporter_lists_failures() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false);
        reporter.on_run_start(2);
        reporter.on_spec_passed(&event("math adds", Status::Passed, None));
        reporter.on_spec_failed(&event("math divides", Status::Failed, Some("Expected 1 to be 2.")));
        reporter.on_run_finished(&RunSummary {
            passed: 1,
            failed: 1,
            duration_ms: 7,
            ..Default::default()
        });

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(out.contains("✓ math adds"));
        assert!(out.contains("✗ math divides"));
        assert!(out.contains("1) math divides"));
        assert!(out.contains("    Expected 1 to be 2."));
        assert!(out.contains("2 specs, 1 passed, 1 failed, 0 skipped in 7ms"));
        assert!(!out.contains("\x1b["));
    }

    #[test]
    fn test_multi_reporter_fans_out() {
        struct Counter(std::rc::Rc<std::cell::Cell<usize>>);
        impl ResultListener for Counter {
            fn on_spec_passed(&mut self, _event: &ResultEvent) {
                self.0.set(self.0.get() + 1);
            }
            fn on_spec_failed(&mut self, _event: &ResultEvent) {}
            fn on_run_finished(&mut self, _summary: &RunSummary) {}
        }

        let hits = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut multi = MultiReporter::new(vec![
            Box::new(Counter(hits.clone())),
            Box::new(Counter(hits.clone())),
        ]);
        multi.on_spec_passed(&event("a", Status::Passed, None));
        assert_eq!(hits.get(), 2);
        assert_eq!(multi.len(), 2);
    }
}
