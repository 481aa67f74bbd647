//! Per-run inputs: which job is being triaged and how to report it.

use serde::{Deserialize, Serialize};

use crate::failure::SECRET_SCAN_STEP;

/// The CI job under inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub name: String,
    pub build_id: String,
    /// Link to the job's build page, when the CI system has one.
    pub url: Option<String>,
}

impl JobContext {
    pub fn new(name: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build_id: build_id.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Wiki-markup link to the build, or the bare job name.
    pub fn link_markup(&self) -> String {
        match &self.url {
            Some(url) => format!("[{}|{}]", self.name, url),
            None => self.name.clone(),
        }
    }
}

/// Run-level reporting switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOptions {
    /// File one issue per failed test case instead of one per failed step.
    pub verbose_test_failure_reporting: bool,
    /// Cap on newly filed issues; only honored with verbose reporting.
    pub max_tickets: Option<usize>,
    /// Extra labels attached to every created issue.
    pub additional_labels: Vec<String>,
    /// Request a failing exit status when test failures survive triage.
    pub fail_with_test_failures: bool,
    /// Request a failing exit status when pod failures survive triage.
    pub fail_with_pod_failures: bool,
    /// Annotate previously filed issues when the job passes.
    pub notify_passing: bool,
    /// Step name assigned to secret-scan detections.
    pub secret_scan_step: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            verbose_test_failure_reporting: false,
            max_tickets: None,
            additional_labels: Vec::new(),
            fail_with_test_failures: false,
            fail_with_pod_failures: false,
            notify_passing: true,
            secret_scan_step: SECRET_SCAN_STEP.to_string(),
        }
    }
}

impl ReportOptions {
    /// The ticket cap in effect for this run.
    pub fn ticket_limit(&self) -> Option<usize> {
        if self.verbose_test_failure_reporting {
            self.max_tickets
        } else {
            None
        }
    }
}
