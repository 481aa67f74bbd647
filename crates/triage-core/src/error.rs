//! Error taxonomy for the triage engine.
//!
//! Configuration errors are fatal: callers surface them and exit. Tracker
//! errors are scoped to a single call and never abort a whole run.

use std::path::PathBuf;

/// Errors raised while building rules and configuration.
///
/// Every variant that concerns a single rule carries the rule's rendered
/// JSON so the operator can find the offending entry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rule is missing required key `{key}`: {rule}")]
    MissingField { key: &'static str, rule: String },

    #[error("key `{key}` must be {expected}: {rule}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        rule: String,
    },

    #[error("key `{key}` is set to !default but no default is configured: {rule}")]
    MissingDefault { key: &'static str, rule: String },

    #[error("invalid assignee `{value}`, expected an email address: {rule}")]
    InvalidEmail { value: String, rule: String },

    #[error(
        "invalid priority `{value}`, expected Blocker, Critical, Major, Normal or Minor: {rule}"
    )]
    InvalidPriority { value: String, rule: String },

    #[error("label `{value}` must not contain whitespace: {rule}")]
    WhitespaceInLabel { value: String, rule: String },

    #[error("invalid failure_type `{value}`, expected pod_failure, test_failure or all: {rule}")]
    InvalidFailureKind { value: String, rule: String },

    #[error("invalid step pattern `{value}` ({reason}): {rule}")]
    InvalidStepPattern {
        value: String,
        reason: String,
        rule: String,
    },

    #[error("no default project configured")]
    NoDefaultProject,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors produced by an [`IssueTracker`](crate::tracker::IssueTracker)
/// after its own retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Request(String),

    #[error("tracker returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("invalid tracker response: {0}")]
    InvalidResponse(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_key_and_rule() {
        let err = ConfigError::MissingField {
            key: "classification",
            rule: r#"{"step":"install"}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("classification"));
        assert!(msg.contains(r#"{"step":"install"}"#));
    }

    #[test]
    fn test_tracker_status_error() {
        let err = TrackerError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("unavailable"));
    }
}
