//! Listener Protocol: framework → host payloads
//!
//! `runner.js` forwards each framework reporter callback to the host as a
//! JSON string. These types mirror those payloads and convert spec results
//! into `ResultEvent`s.

use crate::reporter::{ResultEvent, Status};
use serde::Deserialize;

/// Failure messages are truncated to this many bytes
pub const MAX_MESSAGE_LEN: usize = 4096;

/// `jasmineStarted` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    #[serde(default)]
    pub total_specs_defined: usize,
}

/// Framework-level spec status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    Passed,
    Failed,
    Pending,
    Disabled,
}

/// One failed expectation (or thrown error)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    #[serde(default)]
    pub matcher_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: String,
    /// Set when the failure came from an exception rather than a matcher
    #[serde(default)]
    pub thrown: bool,
}

/// `specDone` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub full_name: String,
    #[serde(default)]
    pub file: String,
    pub status: SpecStatus,
    #[serde(default)]
    pub failed_expectations: Vec<Expectation>,
    #[serde(default)]
    pub pending_reason: String,
    #[serde(default)]
    pub duration_ms: f64,
}

/// `suiteDone` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuitePayload {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub failed_expectations: Vec<Expectation>,
}

/// `jasmineDone` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    #[serde(default)]
    pub overall_status: String,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub failed_expectations: Vec<Expectation>,
}

impl SpecPayload {
    pub fn status(&self) -> Status {
        match self.status {
            SpecStatus::Passed => Status::Passed,
            SpecStatus::Pending | SpecStatus::Disabled => Status::Skipped,
            SpecStatus::Failed if self.failed_expectations.iter().any(|e| e.thrown) => Status::Error,
            SpecStatus::Failed => Status::Failed,
        }
    }

    pub fn into_event(self) -> ResultEvent {
        let status = self.status();
        let message = match status {
            Status::Failed | Status::Error => Some(failure_message(&self.failed_expectations)),
            Status::Skipped if !self.pending_reason.is_empty() => Some(self.pending_reason.clone()),
            _ => None,
        };

        ResultEvent {
            name: self.full_name,
            file: self.file,
            status,
            message: message.map(truncate_message),
            duration_ms: self.duration_ms.max(0.0) as u64,
        }
    }
}

impl SuitePayload {
    /// One line per suite-level failure, prefixed with the suite name
    pub fn errors(&self) -> Vec<String> {
        self.failed_expectations
            .iter()
            .map(|e| format!("{}: {}", self.full_name, e.message))
            .collect()
    }
}

/// Join the failure messages of a spec; thrown errors keep their stack.
pub fn failure_message(expectations: &[Expectation]) -> String {
    let mut lines = Vec::with_capacity(expectations.len());
    for e in expectations {
        if e.thrown && !e.stack.is_empty() && !e.stack.contains(&e.message) {
            lines.push(format!("{}\n{}", e.message, e.stack));
        } else {
            lines.push(e.message.clone());
        }
    }
    lines.join("\n")
}

fn truncate_message(msg: String) -> String {
    if msg.len() <= MAX_MESSAGE_LEN {
        return msg;
    }
    let mut end = MAX_MESSAGE_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &msg[..end])
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passed_spec() {
        let json = r#"{"id":"spec0","description":"adds","fullName":"math adds","file":"math.test.js",
            "status":"passed","failedExpectations":[],"passedExpectations":[{"matcherName":"toBe"}],
            "pendingReason":"","durationMs":2}"#;
        let spec: SpecPayload = serde_json::from_str(json).unwrap();
        let event = spec.into_event();
        assert_eq!(event.name, "math adds");
        assert_eq!(event.file, "math.test.js");
        assert_eq!(event.status, Status::Passed);
        assert_eq!(event.message, None);
        assert_eq!(event.duration_ms, 2);
    }

    #[test]
    fn test_thrown_failure_is_error_status() {
        let json = r#"{"fullName":"users throws","status":"failed","failedExpectations":[
            {"matcherName":"","message":"TypeError: x is not a function","stack":"","thrown":true}]}"#;
        let spec: SpecPayload = serde_json::from_str(json).unwrap();
        assert_eq!(spec.status(), Status::Error);
        assert_eq!(
            spec.into_event().message.as_deref(),
            Some("TypeError: x is not a function")
        );
    }

    #[test]
    fn test_multiple_expectations_joined() {
        let json = r#"{"fullName":"x","status":"failed","failedExpectations":[
            {"matcherName":"toBe","message":"Expected 1 to be 2."},
            {"matcherName":"toEqual","message":"Expected 'a' to equal 'b'."}]}"#;
        let spec: SpecPayload = serde_json::from_str(json).unwrap();
        assert_eq!(spec.status(), Status::Failed);
        assert_eq!(
            spec.into_event().message.unwrap(),
            "Expected 1 to be 2.\nExpected 'a' to equal 'b'."
        );
    }

    #[test]
    fn test_pending_and_disabled_are_skipped() {
        for status in ["pending", "disabled"] {
            let json = format!(r#"{{"fullName":"x","status":"{}"}}"#, status);
            let spec: SpecPayload = serde_json::from_str(&json).unwrap();
            assert_eq!(spec.status(), Status::Skipped);
        }
    }

    #[test]
    fn test_suite_errors_are_prefixed() {
        let json = r#"{"fullName":"db","status":"failed","failedExpectations":[
            {"message":"Error: teardown failed","thrown":true}]}"#;
        let suite: SuitePayload = serde_json::from_str(json).unwrap();
        assert_eq!(suite.errors(), vec!["db: Error: teardown failed".to_string()]);
    }

    #[test]
    fn test_truncate_message_respects_char_boundaries() {
        let long = "é".repeat(MAX_MESSAGE_LEN);
        let truncated = truncate_message(long);
        assert!(truncated.ends_with("... [truncated]"));
        assert!(truncated.len() <= MAX_MESSAGE_LEN + "... [truncated]".len());
    }
}
