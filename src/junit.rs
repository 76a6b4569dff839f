//! JUnit XML Reporter for CI Integration
//!
//! Buffers spec outcomes and writes a JUnit-compatible report when the run
//! finishes. One `<testsuite>` per test file, so CI dashboards group specs
//! the way they were written.

use crate::reporter::{ResultEvent, ResultListener, RunSummary, Status};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Strip ANSI color codes and null bytes from strings
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // Skip until we hit a letter
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else if c != '\0' {
            result.push(c);
        }
    }
    result
}

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@skipped")]
    skipped: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<Skipped>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "$text")]
    body: String,
}

#[derive(Serialize)]
struct Skipped {}

/// `math/add.test.js` -> `math.add`
fn classname_for(file: &str) -> String {
    let trimmed = file
        .strip_suffix(".js")
        .unwrap_or(file)
        .trim_end_matches(".test")
        .trim_end_matches(".spec");
    if trimmed.is_empty() {
        "jasmine".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

// =============================================================================
// JunitReporter
// =============================================================================

struct BufferedCase {
    file: String,
    case: TestCase,
    status: Status,
}

/// Reporter that buffers results and writes JUnit XML on completion
pub struct JunitReporter {
    output_path: PathBuf,
    cases: Vec<BufferedCase>,
}

impl JunitReporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            output_path: path,
            cases: Vec::new(),
        }
    }

    fn buffer(&mut self, event: &ResultEvent) {
        let body = || strip_ansi_codes(event.message.as_deref().unwrap_or("Spec failed"));
        let first_line = || {
            body()
                .lines()
                .next()
                .unwrap_or("Spec failed")
                .to_string()
        };

        let case = TestCase {
            name: event.name.clone(),
            classname: classname_for(&event.file),
            time: event.duration_ms as f64 / 1000.0,
            failure: (event.status == Status::Failed).then(|| Failure {
                message: first_line(),
                body: body(),
            }),
            error: (event.status == Status::Error).then(|| Failure {
                message: first_line(),
                body: body(),
            }),
            skipped: (event.status == Status::Skipped).then_some(Skipped {}),
        };

        self.cases.push(BufferedCase {
            file: event.file.clone(),
            case,
            status: event.status,
        });
    }

    fn build_document(&mut self, summary: &RunSummary) -> TestSuites {
        let mut suites: Vec<TestSuite> = Vec::new();

        for buffered in std::mem::take(&mut self.cases) {
            let name = if buffered.file.is_empty() {
                "jasmine".to_string()
            } else {
                buffered.file.clone()
            };

            let index = match suites.iter().position(|s| s.name == name) {
                Some(i) => i,
                None => {
                    suites.push(TestSuite {
                        name,
                        tests: 0,
                        failures: 0,
                        errors: 0,
                        skipped: 0,
                        time: 0.0,
                        cases: Vec::new(),
                    });
                    suites.len() - 1
                }
            };

            let suite = &mut suites[index];
            suite.tests += 1;
            suite.time += buffered.case.time;
            match buffered.status {
                Status::Failed => suite.failures += 1,
                Status::Error => suite.errors += 1,
                Status::Skipped => suite.skipped += 1,
                Status::Passed => {}
            }
            suite.cases.push(buffered.case);
        }

        // Suite-level errors have no spec of their own
        if !summary.errors.is_empty() {
            let cases: Vec<TestCase> = summary
                .errors
                .iter()
                .map(|e| TestCase {
                    name: "suite error".to_string(),
                    classname: "jasmine".to_string(),
                    time: 0.0,
                    failure: None,
                    error: Some(Failure {
                        message: strip_ansi_codes(e.lines().next().unwrap_or_default()),
                        body: strip_ansi_codes(e),
                    }),
                    skipped: None,
                })
                .collect();
            suites.push(TestSuite {
                name: "suite errors".to_string(),
                tests: cases.len(),
                failures: 0,
                errors: cases.len(),
                skipped: 0,
                time: 0.0,
                cases,
            });
        }

        TestSuites {
            tests: suites.iter().map(|s| s.tests).sum(),
            failures: suites.iter().map(|s| s.failures).sum(),
            errors: suites.iter().map(|s| s.errors).sum(),
            time: summary.duration_ms as f64 / 1000.0,
            suites,
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        let root = self.build_document(summary);
        match self.write(&root) {
            Ok(()) => eprintln!(
                "[jasmine-runner] JUnit report written to {}",
                self.output_path.display()
            ),
            Err(e) => eprintln!("[jasmine-runner] Failed to write JUnit report: {}", e),
        }
    }

    fn write(&self, root: &TestSuites) -> std::io::Result<()> {
        let xml = quick_xml::se::to_string(root)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = BufWriter::new(File::create(&self.output_path)?);
        writer.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        writer.write_all(xml.as_bytes())?;
        writer.flush()
    }
}

impl ResultListener for JunitReporter {
    fn on_run_start(&mut self, _total: usize) {
        self.cases.clear();
    }

    fn on_spec_passed(&mut self, event: &ResultEvent) {
        self.buffer(event);
    }

    fn on_spec_failed(&mut self, event: &ResultEvent) {
        self.buffer(event);
    }

    fn on_spec_skipped(&mut self, event: &ResultEvent) {
        self.buffer(event);
    }

    fn on_run_finished(&mut self, summary: &RunSummary) {
        self.finish(summary);
    }

    /// An aborted run still produces a report, so CI sees the load failure
    fn on_error(&mut self, message: &str) {
        self.cases.clear();
        self.finish(&RunSummary {
            errors: vec![message.to_string()],
            ..Default::default()
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(name: &str, file: &str, status: Status, message: Option<&str>) -> ResultEvent {
        ResultEvent {
            name: name.to_string(),
            file: file.to_string(),
            status,
            message: message.map(str::to_string),
            duration_ms: 1500,
        }
    }

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mRed text\x1b[0m"), "Red text");
        assert_eq!(strip_ansi_codes("plain text"), "plain text");
        assert_eq!(strip_ansi_codes("\x1b[1;31;40mColored\x1b[0m normal"), "Colored normal");
        assert_eq!(strip_ansi_codes("text\0with\0nulls"), "textwithnulls");
    }

    #[test]
    fn test_classname_for() {
        assert_eq!(classname_for("math/add.test.js"), "math.add");
        assert_eq!(classname_for("openidm.spec.js"), "openidm");
        assert_eq!(classname_for(""), "jasmine");
    }

    #[test]
    fn test_junit_reporter_buffers_specs() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_run_start(2);
        reporter.on_spec_passed(&event("a", "x.test.js", Status::Passed, None));
        reporter.on_spec_failed(&event("b", "x.test.js", Status::Failed, Some("boom")));

        assert_eq!(reporter.cases.len(), 2);
        assert!(reporter.cases[0].case.failure.is_none());
        assert!(reporter.cases[1].case.failure.is_some());
        assert!((reporter.cases[0].case.time - 1.5).abs() < 0.001);
    }

    #[test]
    fn test_document_groups_by_file() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_spec_passed(&event("a", "one.test.js", Status::Passed, None));
        reporter.on_spec_failed(&event("b", "two.spec.js", Status::Error, Some("TypeError: x")));
        reporter.on_spec_skipped(&event("c", "one.test.js", Status::Skipped, None));

        let doc = reporter.build_document(&RunSummary::default());
        assert_eq!(doc.suites.len(), 2);
        assert_eq!(doc.suites[0].name, "one.test.js");
        assert_eq!(doc.suites[0].tests, 2);
        assert_eq!(doc.suites[0].skipped, 1);
        assert_eq!(doc.suites[1].errors, 1);
        assert_eq!(doc.errors, 1);
    }

    #[test]
    fn test_failure_strips_ansi() {
        let mut reporter = JunitReporter::new(PathBuf::from("/tmp/unused.xml"));
        reporter.on_spec_failed(&event(
            "f",
            "x.test.js",
            Status::Failed,
            Some("\x1b[31mExpected 1 to be 2.\x1b[0m"),
        ));
        let failure = reporter.cases[0].case.failure.as_ref().unwrap();
        assert_eq!(failure.body, "Expected 1 to be 2.");
    }

    #[test]
    fn test_writes_xml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("report.xml");
        let mut reporter = JunitReporter::new(path.clone());
        reporter.on_run_start(1);
        reporter.on_spec_failed(&event("math adds", "math.test.js", Status::Failed, Some("Expected 1 to be 2.")));
        reporter.on_run_finished(&RunSummary {
            failed: 1,
            errors: vec!["db: Error: teardown".to_string()],
            ..Default::default()
        });

        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuites"));
        assert!(xml.contains("name=\"math adds\""));
        assert!(xml.contains("Expected 1 to be 2."));
        assert!(xml.contains("suite errors"));
    }

    #[test]
    fn test_on_error_writes_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("aborted.xml");
        let mut reporter = JunitReporter::new(path.clone());
        reporter.on_error("boot.js:3: SyntaxError: unexpected token");

        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.contains("errors=\"1\""));
        assert!(xml.contains("boot.js:3: SyntaxError: unexpected token"));
    }
}
