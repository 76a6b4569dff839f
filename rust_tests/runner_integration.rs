//! End-to-end runs through the full pipeline with a recording listener

use jasmine_runner::reporter::{ResultEvent, ResultListener, RunSummary, Status};
use jasmine_runner::runner::{
    self, exit_code, RunError, RunOptions, EXIT_ABORTED, EXIT_FAILURES, EXIT_SUCCESS,
};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    events: Vec<ResultEvent>,
    finished: Vec<RunSummary>,
}

impl Recorder {
    fn status_of(&self, name: &str) -> Option<Status> {
        self.events.iter().find(|e| e.name == name).map(|e| e.status)
    }
}

impl ResultListener for Recorder {
    fn on_spec_passed(&mut self, event: &ResultEvent) {
        self.events.push(event.clone());
    }
    fn on_spec_failed(&mut self, event: &ResultEvent) {
        self.events.push(event.clone());
    }
    fn on_spec_skipped(&mut self, event: &ResultEvent) {
        self.events.push(event.clone());
    }
    fn on_run_finished(&mut self, summary: &RunSummary) {
        self.finished.push(summary.clone());
    }
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn run_with(options: &RunOptions) -> (Result<RunSummary, RunError>, Recorder) {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let outcome = runner::run(options, recorder.clone());
    let recorded = std::mem::take(&mut *recorder.borrow_mut());
    (outcome, recorded)
}

fn run_dir(root: &Path) -> (Result<RunSummary, RunError>, Recorder) {
    run_with(&RunOptions::new(root))
}

// =============================================================================
// Core properties
// =============================================================================

#[test]
fn test_empty_root_succeeds_with_zero_specs() {
    let temp = TempDir::new().unwrap();
    let (outcome, recorder) = run_dir(temp.path());

    assert_eq!(exit_code(&outcome), EXIT_SUCCESS);
    let summary = outcome.unwrap();
    assert_eq!(summary.total(), 0);
    assert!(recorder.events.is_empty());
    assert_eq!(recorder.finished.len(), 1);
}

#[test]
fn test_single_passing_spec() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "foo.test.js",
        "describe('foo', function () { it('passes', function () { expect(1 + 1).toBe(2); }); });",
    );

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(exit_code(&outcome), EXIT_SUCCESS);
    let summary = outcome.unwrap();
    assert_eq!((summary.passed, summary.failed), (1, 0));
    assert_eq!(recorder.events[0].file, "foo.test.js");
}

#[test]
fn test_single_failing_spec() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "bar.spec.js",
        "describe('bar', function () { it('fails', function () { expect('a').toEqual('b'); }); });",
    );

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(exit_code(&outcome), EXIT_FAILURES);
    assert_eq!(outcome.unwrap().failed, 1);

    let event = &recorder.events[0];
    assert_eq!(event.status, Status::Failed);
    assert_eq!(event.message.as_deref(), Some("Expected 'a' to equal 'b'."));
}

#[test]
fn test_syntax_error_aborts_before_any_result() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "ok.test.js",
        "describe('ok', function () { it('runs', function () {}); });",
    );
    write(temp.path(), "syntax.test.js", "describe('x', function () {\n  it('y' function () {});\n});");

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(exit_code(&outcome), EXIT_ABORTED);
    assert!(recorder.events.is_empty());
    assert!(recorder.finished.is_empty());

    let message = outcome.unwrap_err().to_string();
    assert!(message.contains("syntax.test.js"), "{}", message);
}

#[test]
fn test_module_resolved_from_source_root() {
    let tests = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    write(
        sources.path(),
        "lib/strings.js",
        "exports.shout = function (s) { return s.toUpperCase() + '!'; };",
    );
    write(
        tests.path(),
        "strings.test.js",
        r#"
var strings = require('lib/strings');
describe('strings', function () {
    it('shouts', function () { expect(strings.shout('hi')).toBe('HI!'); });
});
"#,
    );

    let options = RunOptions::new(tests.path()).with_source_roots(vec![sources.path().into()]);
    let (outcome, _) = run_with(&options);
    assert_eq!(exit_code(&outcome), EXIT_SUCCESS);
    assert_eq!(outcome.unwrap().passed, 1);
}

#[test]
fn test_unresolvable_module_is_load_error() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "missing.test.js",
        "var nope = require('does/not/exist');\ndescribe('m', function () { it('x', function () {}); });",
    );

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(exit_code(&outcome), EXIT_ABORTED);
    assert!(recorder.finished.is_empty());
    let message = outcome.unwrap_err().to_string();
    assert!(message.contains("missing.test.js"), "{}", message);
    assert!(message.contains("Cannot find module 'does/not/exist'"), "{}", message);
}

#[test]
fn test_repeated_runs_are_independent() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "state.test.js",
        r#"
var counter = (typeof counter === 'undefined') ? 0 : counter;
describe('state', function () {
    it('starts fresh', function () { counter++; expect(counter).toBe(1); });
});
"#,
    );

    let (first, first_rec) = run_dir(temp.path());
    let (second, second_rec) = run_dir(temp.path());
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(
        (first.passed, first.failed, first.skipped),
        (second.passed, second.failed, second.skipped)
    );
    assert_eq!(first.passed, 1);
    assert_eq!(
        first_rec.events.iter().map(|e| (&e.name, e.status)).collect::<Vec<_>>(),
        second_rec.events.iter().map(|e| (&e.name, e.status)).collect::<Vec<_>>()
    );
}

// =============================================================================
// Framework surface
// =============================================================================

#[test]
fn test_hooks_run_around_each_spec() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "hooks.test.js",
        r#"
describe('hooks', function () {
    var log = [];
    beforeAll(function () { log.push('beforeAll'); });
    beforeEach(function () { log.push('before'); });
    afterEach(function () { log.push('after'); });
    it('one', function () { log.push('one'); });
    it('two', function () {
        log.push('two');
        expect(log).toEqual(['beforeAll', 'before', 'one', 'after', 'before', 'two']);
    });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    let summary = outcome.unwrap();
    assert_eq!(summary.passed, 2, "{:?}", recorder.events);
}

#[test]
fn test_spies_and_asymmetric_matchers() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "spies.spec.js",
        r#"
describe('spies', function () {
    var service = { fetch: function (id) { return 'real-' + id; } };

    it('tracks calls', function () {
        spyOn(service, 'fetch').and.returnValue('stubbed');
        expect(service.fetch(7)).toBe('stubbed');
        expect(service.fetch).toHaveBeenCalledWith(7);
        expect(service.fetch).toHaveBeenCalledTimes(1);
        expect(service.fetch.calls.mostRecent().args).toEqual([7]);
    });

    it('restores spies between specs', function () {
        expect(service.fetch(1)).toBe('real-1');
    });

    it('supports callThrough and callFake', function () {
        spyOn(service, 'fetch').and.callThrough();
        expect(service.fetch(2)).toBe('real-2');
        service.fetch.and.callFake(function (id) { return 'fake-' + id; });
        expect(service.fetch(3)).toBe('fake-3');
    });

    it('creates spy objects', function () {
        var api = jasmine.createSpyObj('api', ['get', 'put']);
        api.get({ id: 1, name: 'x' });
        expect(api.get).toHaveBeenCalledWith(jasmine.objectContaining({ id: 1 }));
        expect(api.put).not.toHaveBeenCalled();
        expect([1, 'a']).toEqual([jasmine.any(Number), jasmine.any(String)]);
    });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    let summary = outcome.unwrap();
    assert_eq!(summary.passed, 4, "{:?}", recorder.events);
    assert_eq!(summary.failed, 0);
}

#[test]
fn test_builtin_matchers() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "matchers.test.js",
        r#"
describe('matchers', function () {
    it('covers the basics', function () {
        expect(true).toBeTruthy();
        expect(0).toBeFalsy();
        expect(null).toBeNull();
        expect(undefined).toBeUndefined();
        expect({}).toBeDefined();
        expect(NaN).toBeNaN();
        expect([1, 2, 3]).toContain(2);
        expect('haystack').toContain('st');
        expect('abc-123').toMatch(/\d+/);
        expect(5).toBeGreaterThan(4);
        expect(5).toBeLessThan(6);
        expect(5).toBeGreaterThanOrEqual(5);
        expect(5).toBeLessThanOrEqual(5);
        expect(0.1 + 0.2).toBeCloseTo(0.3, 5);
        expect({ a: [1, { b: 2 }] }).toEqual({ a: [1, { b: 2 }] });
        expect(function () { throw new TypeError('bad'); }).toThrowError(TypeError, 'bad');
        expect(function () {}).not.toThrow();
    });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(outcome.unwrap().passed, 1, "{:?}", recorder.events);
}

#[test]
fn test_focus_and_exclusion() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "focus.test.js",
        r#"
describe('focus', function () {
    fit('focused', function () { expect(1).toBe(1); });
    it('unfocused', function () { expect(1).toBe(2); });
    xit('excluded', function () { expect(1).toBe(2); });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    let summary = outcome.unwrap();
    assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 0, 2));
    assert_eq!(recorder.status_of("focus focused"), Some(Status::Passed));
    assert_eq!(recorder.status_of("focus unfocused"), Some(Status::Skipped));
    assert_eq!(recorder.status_of("focus excluded"), Some(Status::Skipped));
}

#[test]
fn test_pending_is_skipped() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "pending.test.js",
        r#"
describe('pending', function () {
    it('has no body');
    it('is marked', function () { pending('later'); });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    let summary = outcome.unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(summary.success());
    assert_eq!(recorder.events[1].message.as_deref(), Some("later"));
}

#[test]
fn test_thrown_error_does_not_stop_other_specs() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "errors.test.js",
        r#"
describe('errors', function () {
    it('throws', function () { null.property; });
    it('still runs', function () { expect(true).toBe(true); });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    let summary = outcome.unwrap();
    assert_eq!((summary.passed, summary.failed), (1, 1));
    assert_eq!(recorder.status_of("errors throws"), Some(Status::Error));
    assert!(recorder.events[0].message.as_deref().unwrap_or("").contains("TypeError"));
}

#[test]
fn test_config_env_is_visible_to_specs() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "env.test.js",
        "describe('env', function () { it('reads', function () { expect(process.env.SERVICE_URL).toBe('http://svc'); }); });",
    );

    let mut options = RunOptions::new(temp.path());
    options
        .env
        .insert("SERVICE_URL".to_string(), "http://svc".to_string());
    let (outcome, _) = run_with(&options);
    assert_eq!(outcome.unwrap().passed, 1);
}

#[test]
fn test_custom_matchers_and_mock_clock() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "extras.test.js",
        r#"
describe('extras', function () {
    beforeEach(function () {
        jasmine.addMatchers({
            toBeEven: function () {
                return { compare: function (actual) { return { pass: actual % 2 === 0 }; } };
            }
        });
        jasmine.clock().install();
    });
    afterEach(function () { jasmine.clock().uninstall(); });

    it('uses a custom matcher', function () {
        expect(4).toBeEven();
        expect(3).not.toBeEven();
    });

    it('advances timers synchronously', function () {
        var fired = 0;
        setTimeout(function () { fired++; }, 100);
        jasmine.clock().tick(99);
        expect(fired).toBe(0);
        jasmine.clock().tick(1);
        expect(fired).toBe(1);
    });
});
"#,
    );

    let (outcome, recorder) = run_dir(temp.path());
    assert_eq!(outcome.unwrap().passed, 2, "{:?}", recorder.events);
}
