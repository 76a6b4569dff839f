//! CLI Integration Tests
//!
//! Drives the built binary end to end:
//! - exit codes for passing, failing and aborted runs
//! - --format json, --junit-xml, --list
//! - jasmine-runner.toml source roots and env

use clap::Parser;
use jasmine_runner::config::{Cli, OutputFormat};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jasmine-runner"));
    cmd.env_remove("JASMINE_RUNNER_FORMAT")
        .env_remove("JASMINE_RUNNER_JUNIT_XML")
        .env_remove("JASMINE_RUNNER_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    bin().args(args).output().expect("failed to launch jasmine-runner")
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const PASSING: &str =
    "describe('foo', function () { it('passes', function () { expect(true).toBe(true); }); });";
const FAILING: &str =
    "describe('bar', function () { it('fails', function () { expect(1).toBe(2); }); });";

// =============================================================================
// Argument parsing
// =============================================================================

#[test]
fn test_cli_defaults() {
    let cli = Cli::try_parse_from(["jasmine-runner", "tests"]).unwrap();
    assert_eq!(cli.test_root, Path::new("tests"));
    assert!(cli.source_roots.is_empty());
    assert_eq!(cli.format, OutputFormat::Human);
    assert!(!cli.watch && !cli.list && !cli.no_color);
    assert!(cli.junit_xml.is_none());
}

#[test]
fn test_cli_all_flags() {
    let cli = Cli::try_parse_from([
        "jasmine-runner",
        "tests",
        "src",
        "lib",
        "--format",
        "json",
        "--junit-xml",
        "out.xml",
        "--no-color",
        "-w",
    ])
    .unwrap();
    assert_eq!(cli.source_roots.len(), 2);
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(cli.watch);
    assert!(cli.no_color);
}

#[test]
fn test_missing_root_argument_is_usage_error() {
    let output = run(&[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("TEST_ROOT"), "{}", stderr(&output));
}

// =============================================================================
// Exit codes
// =============================================================================

#[test]
fn test_empty_root_exits_zero() {
    let temp = TempDir::new().unwrap();
    let output = run(&[temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("0 specs, 0 passed, 0 failed"));
}

#[test]
fn test_passing_run_exits_zero() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "foo.test.js", PASSING);

    let output = run(&[temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("foo passes"), "{}", out);
    assert!(out.contains("1 specs, 1 passed, 0 failed"), "{}", out);
}

#[test]
fn test_single_file_root_runs_that_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "foo.test.js", PASSING);
    write(temp.path(), "bar.spec.js", FAILING);

    let file = temp.path().join("foo.test.js");
    let output = run(&[file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("1 specs, 1 passed, 0 failed"), "{}", stdout(&output));
}

#[test]
fn test_failing_run_exits_one() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "bar.spec.js", FAILING);

    let output = run(&[temp.path().to_str().unwrap(), "--no-color"]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Failures:"), "{}", out);
    assert!(out.contains("Expected 1 to be 2."), "{}", out);
    assert!(out.contains("1 failed"), "{}", out);
}

#[test]
fn test_syntax_error_exits_two_without_summary() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "broken.test.js", "describe('x', function () {");

    let output = run(&[temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!stdout(&output).contains("specs,"));
    let err = stderr(&output);
    assert!(err.contains("FATAL ERROR"), "{}", err);
    assert!(err.contains("broken.test.js"), "{}", err);
}

#[test]
fn test_malformed_config_exits_two() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "jasmine-runner.toml", "[runner\n");

    let output = run(&[temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("jasmine-runner.toml"));
}

// =============================================================================
// Output formats
// =============================================================================

#[test]
fn test_json_format_emits_ndjson() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "foo.test.js", PASSING);
    write(temp.path(), "bar.spec.js", FAILING);

    let output = run(&[temp.path().to_str().unwrap(), "--format", "json"]);
    assert_eq!(output.status.code(), Some(1));

    let events: Vec<serde_json::Value> = stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line is JSON"))
        .collect();
    assert_eq!(events.first().unwrap()["event"], "run_start");
    assert_eq!(events.first().unwrap()["count"], 2);
    assert_eq!(events.last().unwrap()["event"], "run_finished");
    assert_eq!(events.last().unwrap()["passed"], 1);
    assert_eq!(events.last().unwrap()["failed"], 1);

    // bar.spec.js sorts before foo.test.js
    assert_eq!(events[1]["id"], "bar fails");
    assert_eq!(events[1]["status"], "fail");
    assert_eq!(events[1]["file"], "bar.spec.js");
}

#[test]
fn test_junit_xml_written() {
    let temp = TempDir::new().unwrap();
    let tests = temp.path().join("tests");
    write(&tests, "foo.test.js", PASSING);
    let report = temp.path().join("report.xml");

    let output = run(&[
        tests.to_str().unwrap(),
        "--junit-xml",
        report.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));

    let xml = fs::read_to_string(&report).unwrap();
    assert!(xml.contains("<testsuites"), "{}", xml);
    assert!(xml.contains("foo passes"), "{}", xml);
}

#[test]
fn test_list_prints_discovered_files() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "b/two.spec.js", FAILING);
    write(temp.path(), "a/one.test.js", PASSING);
    write(temp.path(), "a/helper.js", "");

    let output = run(&[temp.path().to_str().unwrap(), "--list"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "a/one.test.js\nb/two.spec.js\n");
}

// =============================================================================
// Source roots and config file
// =============================================================================

#[test]
fn test_source_root_arguments() {
    let temp = TempDir::new().unwrap();
    let tests = temp.path().join("tests");
    let scripts = temp.path().join("scripts");
    write(&scripts, "lib/sum.js", "module.exports = function (a, b) { return a + b; };");
    write(
        &tests,
        "sum.test.js",
        "var sum = require('lib/sum');\ndescribe('sum', function () { it('adds', function () { expect(sum(2, 2)).toBe(4); }); });",
    );

    let output = run(&[tests.to_str().unwrap(), scripts.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
}

#[test]
fn test_config_file_roots_and_env() {
    let temp = TempDir::new().unwrap();
    let tests = temp.path().join("tests");
    write(&temp.path().join("scripts"), "greeting.js", "exports.word = 'hello';");
    write(
        &tests,
        "jasmine-runner.toml",
        "[runner]\nsource_roots = [\"../scripts\"]\n\n[env]\nTARGET = \"world\"\n",
    );
    write(
        &tests,
        "greeting.test.js",
        r#"
var greeting = require('greeting');
describe('greeting', function () {
    it('combines config', function () {
        expect(greeting.word + ' ' + process.env.TARGET).toBe('hello world');
    });
});
"#,
    );

    let output = run(&[tests.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}\n{}", stdout(&output), stderr(&output));
}

#[test]
fn test_console_output_reaches_stdout() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "log.test.js",
        "describe('log', function () { it('prints', function () { console.log('hello from spec', { n: 1 }); }); });",
    );

    let output = run(&[temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("hello from spec"));
}
