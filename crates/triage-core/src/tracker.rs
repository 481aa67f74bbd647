//! Issue tracker capability boundary.
//!
//! The engine only talks to the tracker through [`IssueTracker`]. Queries are
//! typed ([`IssueQuery`]) so each backend renders its own search language and
//! the in-memory fake can evaluate them directly.
//!
//! Implementations own their retry policy; the engine treats the final
//! outcome of each call as authoritative.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TrackerResult;
use crate::rule::Priority;

/// Label attached to every issue this tool files.
pub const TOOL_LABEL: &str = "ci-triage";

/// Label added to open issues once their job passes again.
pub const PASSED_LABEL: &str = "passed-since-filed";

/// Issues carrying this label are skipped by the passing-job notifier.
pub const IGNORE_PASSING_LABEL: &str = "ignore-passing-notification";

/// Label attached to informational issues filed for passing jobs.
pub const SUCCESS_LABEL: &str = "success";

/// Tracker issue key, e.g. `OCPBUGS-1234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueKey(pub String);

impl IssueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project key prefix (`OCPBUGS` for `OCPBUGS-1234`).
    pub fn project(&self) -> &str {
        self.0
            .rsplit_once('-')
            .map(|(project, _)| project)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    Bug,
    Story,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Bug => "Bug",
            IssueType::Story => "Story",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Unresolved,
    Resolved,
    Any,
}

/// A label-based issue search.
///
/// `labels` are ANDed: a match carries every one of them. `excluded_labels`
/// must all be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueQuery {
    pub project: String,
    pub issue_type: IssueType,
    pub resolution: Resolution,
    pub labels: Vec<String>,
    pub excluded_labels: Vec<String>,
    /// Newest first when set.
    pub limit: Option<usize>,
}

impl IssueQuery {
    pub fn bugs(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            issue_type: IssueType::Bug,
            resolution: Resolution::Any,
            labels: Vec::new(),
            excluded_labels: Vec::new(),
            limit: None,
        }
    }

    pub fn unresolved(mut self) -> Self {
        self.resolution = Resolution::Unresolved;
        self
    }

    pub fn resolved(mut self) -> Self {
        self.resolution = Resolution::Resolved;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn without_label(mut self, label: impl Into<String>) -> Self {
        self.excluded_labels.push(label.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Everything needed to create one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub project: String,
    pub summary: String,
    pub description: String,
    pub issue_type: IssueType,
    pub components: Vec<String>,
    pub epic: Option<String>,
    pub attachments: Vec<PathBuf>,
    pub labels: Vec<String>,
    pub affects_version: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub security_level: Option<String>,
    /// Close the issue right after creating it.
    pub close: bool,
}

impl NewIssue {
    pub fn bug(
        project: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            summary: summary.into(),
            description: description.into(),
            issue_type: IssueType::Bug,
            components: Vec::new(),
            epic: None,
            attachments: Vec::new(),
            labels: Vec::new(),
            affects_version: None,
            assignee: None,
            priority: None,
            security_level: None,
            close: false,
        }
    }
}

/// Capability calls the engine makes against the issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create an issue and return its key.
    async fn create_issue(&self, issue: NewIssue) -> TrackerResult<IssueKey>;

    /// Keys of the issues matching `query`.
    async fn search_issues(&self, query: &IssueQuery) -> TrackerResult<Vec<IssueKey>>;

    /// A browsable link to the results of `query`.
    fn search_url(&self, query: &IssueQuery) -> String;

    async fn comment(&self, issue: &IssueKey, body: &str) -> TrackerResult<()>;

    /// Add labels; labels already present are left as they are.
    async fn add_labels(&self, issue: &IssueKey, labels: &[String]) -> TrackerResult<()>;

    /// Link two issues as related. `false` when the tracker refused the link.
    async fn relate_issues(&self, a: &IssueKey, b: &IssueKey) -> TrackerResult<bool>;

    /// Apply the named workflow transition with a comment. `false` when the
    /// issue has no such transition.
    async fn transition_issue(
        &self,
        issue: &IssueKey,
        transition: &str,
        comment: &str,
    ) -> TrackerResult<bool>;
}
