//! Detected failures and the manifest they arrive in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Step name used for secret-scan detections unless configured otherwise.
pub const SECRET_SCAN_STEP: &str = "secret-scan";

/// What kind of problem a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step's pod itself failed.
    PodFailure,
    /// A test case inside the step failed.
    TestFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PodFailure => "pod_failure",
            FailureKind::TestFailure => "test_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pod_failure" => Ok(FailureKind::PodFailure),
            "test_failure" => Ok(FailureKind::TestFailure),
            other => Err(format!("unknown failure kind: {other}")),
        }
    }
}

/// One detected problem in a CI job.
///
/// Immutable after construction except for the ignore flag, which only the
/// classifier sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub step: String,
    #[serde(rename = "failure_type")]
    pub kind: FailureKind,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default, rename = "evidence")]
    pub evidence_path: Option<PathBuf>,
    #[serde(skip)]
    ignored: bool,
}

impl Failure {
    pub fn new(step: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            step: step.into(),
            kind,
            test_name: None,
            evidence_path: None,
            ignored: false,
        }
    }

    pub fn pod(step: impl Into<String>) -> Self {
        Self::new(step, FailureKind::PodFailure)
    }

    pub fn test(step: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self::new(step, FailureKind::TestFailure).with_test_name(test_name)
    }

    pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = Some(test_name.into());
        self
    }

    pub fn with_evidence(mut self, path: impl Into<PathBuf>) -> Self {
        self.evidence_path = Some(path.into());
        self
    }

    /// Whether every rule this failure matched was an ignore rule.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn mark_ignored(&mut self) {
        self.ignored = true;
    }
}

/// A finding reported by the secret scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDetection {
    pub file: PathBuf,
    pub rule_id: String,
}

impl SecretDetection {
    /// Detections become test failures on the scan step, one per rule id.
    pub fn into_failure(self, step: &str) -> Failure {
        Failure::test(step, self.rule_id).with_evidence(self.file)
    }
}

/// The failures collected for one job, as written by the log collectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureManifest {
    #[serde(default)]
    pub failures: Vec<Failure>,
    #[serde(default)]
    pub secret_detections: Vec<SecretDetection>,
}

impl FailureManifest {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Flatten into a single failure list, detections last.
    ///
    /// Repeated observations of the same (step, kind, test) are collapsed.
    pub fn into_failures(self, secret_scan_step: &str) -> Vec<Failure> {
        let mut failures: Vec<Failure> = Vec::with_capacity(self.failures.len());
        let detections = self
            .secret_detections
            .into_iter()
            .map(|d| d.into_failure(secret_scan_step));

        for failure in self.failures.into_iter().chain(detections) {
            let seen = failures.iter().any(|f| {
                f.step == failure.step && f.kind == failure.kind && f.test_name == failure.test_name
            });
            if !seen {
                failures.push(failure);
            }
        }
        failures
    }
}
