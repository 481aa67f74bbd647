//! Error types for the Jira client

use std::path::PathBuf;

use thiserror::Error;
use triage_core::TrackerError;

#[derive(Error, Debug)]
pub enum JiraError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Jira answered with a non-success status
    #[error("Jira returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected Jira response: {0}")]
    InvalidResponse(String),

    #[error("invalid Jira configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JiraError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JiraError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            JiraError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<JiraError> for TrackerError {
    fn from(err: JiraError) -> Self {
        match err {
            JiraError::Status { status: 404, body } => TrackerError::NotFound(body),
            JiraError::Status { status, body } => TrackerError::Status { status, body },
            JiraError::InvalidResponse(msg) => TrackerError::InvalidResponse(msg),
            other => TrackerError::Request(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, JiraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let server = JiraError::Status {
            status: 503,
            body: String::new(),
        };
        let throttled = JiraError::Status {
            status: 429,
            body: String::new(),
        };
        let bad_request = JiraError::Status {
            status: 400,
            body: "bad field".to_string(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!bad_request.is_transient());
        assert!(!JiraError::InvalidResponse("x".to_string()).is_transient());
    }

    #[test]
    fn test_conversion_to_tracker_error() {
        let missing: TrackerError = JiraError::Status {
            status: 404,
            body: "OCPBUGS-1".to_string(),
        }
        .into();
        assert!(matches!(missing, TrackerError::NotFound(_)));

        let status: TrackerError = JiraError::Status {
            status: 400,
            body: "bad field".to_string(),
        }
        .into();
        assert!(matches!(status, TrackerError::Status { status: 400, .. }));
    }
}
