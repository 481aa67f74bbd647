//! In-memory issue tracker for tests and dry runs
//!
//! `MemoryTracker` satisfies the [`IssueTracker`] contract without a server:
//! it stores issues, evaluates [`IssueQuery`] label semantics exactly, and
//! records every call in order so tests can assert on call sequences.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{TrackerError, TrackerResult};
use crate::tracker::*;

/// One recorded tracker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    CreateIssue {
        project: String,
        summary: String,
        labels: Vec<String>,
    },
    SearchIssues(IssueQuery),
    Comment {
        issue: IssueKey,
        body: String,
    },
    AddLabels {
        issue: IssueKey,
        labels: Vec<String>,
    },
    RelateIssues {
        a: IssueKey,
        b: IssueKey,
    },
    TransitionIssue {
        issue: IssueKey,
        transition: String,
    },
}

/// An issue as held by the fake.
#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub key: IssueKey,
    pub project: String,
    pub issue_type: IssueType,
    pub summary: String,
    pub description: String,
    pub labels: BTreeSet<String>,
    pub attachments: Vec<std::path::PathBuf>,
    pub resolved: bool,
    pub status: String,
    pub comments: Vec<String>,
    pub related: Vec<IssueKey>,
}

#[derive(Debug, Default)]
struct State {
    issues: Vec<StoredIssue>,
    calls: Vec<TrackerCall>,
    counters: HashMap<String, u64>,
    failing_search_labels: HashSet<String>,
    allowed_transitions: Option<Vec<String>>,
}

impl State {
    fn next_key(&mut self, project: &str) -> IssueKey {
        let counter = self.counters.entry(project.to_string()).or_insert(0);
        *counter += 1;
        IssueKey(format!("{project}-{counter}"))
    }

    fn issue_mut(&mut self, key: &IssueKey) -> TrackerResult<&mut StoredIssue> {
        self.issues
            .iter_mut()
            .find(|i| &i.key == key)
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }
}

/// In-memory tracker backed by a `Vec<StoredIssue>`.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    state: Mutex<State>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept these transition names (case-insensitive). By default any
    /// transition is accepted.
    pub fn with_transitions<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().allowed_transitions =
            Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Make every search that includes `label` fail.
    pub fn fail_searches_with_label(&self, label: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_search_labels
            .insert(label.to_string());
    }

    /// Insert an existing issue without recording a call.
    pub fn seed_issue(&self, project: &str, labels: &[&str], resolved: bool) -> IssueKey {
        let mut state = self.state.lock().unwrap();
        let key = state.next_key(project);
        state.issues.push(StoredIssue {
            key: key.clone(),
            project: project.to_string(),
            issue_type: IssueType::Bug,
            summary: "seeded".to_string(),
            description: String::new(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            attachments: Vec::new(),
            resolved,
            status: if resolved { "Closed" } else { "New" }.to_string(),
            comments: Vec::new(),
            related: Vec::new(),
        });
        key
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded creations, in order.
    pub fn created(&self) -> Vec<TrackerCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, TrackerCall::CreateIssue { .. }))
            .collect()
    }

    pub fn issue(&self, key: &IssueKey) -> Option<StoredIssue> {
        let state = self.state.lock().unwrap();
        state.issues.iter().find(|i| &i.key == key).cloned()
    }

    pub fn issues(&self) -> Vec<StoredIssue> {
        self.state.lock().unwrap().issues.clone()
    }
}

fn matches_query(issue: &StoredIssue, query: &IssueQuery) -> bool {
    let resolution_ok = match query.resolution {
        Resolution::Unresolved => !issue.resolved,
        Resolution::Resolved => issue.resolved,
        Resolution::Any => true,
    };
    issue.project == query.project
        && issue.issue_type == query.issue_type
        && resolution_ok
        && query.labels.iter().all(|l| issue.labels.contains(l))
        && !query.excluded_labels.iter().any(|l| issue.labels.contains(l))
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn create_issue(&self, issue: NewIssue) -> TrackerResult<IssueKey> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::CreateIssue {
            project: issue.project.clone(),
            summary: issue.summary.clone(),
            labels: issue.labels.clone(),
        });
        let key = state.next_key(&issue.project);
        state.issues.push(StoredIssue {
            key: key.clone(),
            project: issue.project,
            issue_type: issue.issue_type,
            summary: issue.summary,
            description: issue.description,
            labels: issue.labels.into_iter().collect(),
            attachments: issue.attachments,
            resolved: issue.close,
            status: if issue.close { "Closed" } else { "New" }.to_string(),
            comments: Vec::new(),
            related: Vec::new(),
        });
        Ok(key)
    }

    async fn search_issues(&self, query: &IssueQuery) -> TrackerResult<Vec<IssueKey>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::SearchIssues(query.clone()));

        if let Some(label) = query
            .labels
            .iter()
            .find(|l| state.failing_search_labels.contains(*l))
        {
            return Err(TrackerError::Request(format!(
                "search failed for label {label}"
            )));
        }

        let mut found: Vec<IssueKey> = state
            .issues
            .iter()
            .filter(|i| matches_query(i, query))
            .map(|i| i.key.clone())
            .collect();
        if let Some(limit) = query.limit {
            found.reverse();
            found.truncate(limit);
        }
        Ok(found)
    }

    fn search_url(&self, query: &IssueQuery) -> String {
        format!(
            "memory://search?project={}&labels={}",
            query.project,
            query.labels.join(",")
        )
    }

    async fn comment(&self, issue: &IssueKey, body: &str) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::Comment {
            issue: issue.clone(),
            body: body.to_string(),
        });
        state.issue_mut(issue)?.comments.push(body.to_string());
        Ok(())
    }

    async fn add_labels(&self, issue: &IssueKey, labels: &[String]) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::AddLabels {
            issue: issue.clone(),
            labels: labels.to_vec(),
        });
        state
            .issue_mut(issue)?
            .labels
            .extend(labels.iter().cloned());
        Ok(())
    }

    async fn relate_issues(&self, a: &IssueKey, b: &IssueKey) -> TrackerResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::RelateIssues {
            a: a.clone(),
            b: b.clone(),
        });
        state.issue_mut(b)?;
        state.issue_mut(a)?.related.push(b.clone());
        state.issue_mut(b)?.related.push(a.clone());
        Ok(true)
    }

    async fn transition_issue(
        &self,
        issue: &IssueKey,
        transition: &str,
        comment: &str,
    ) -> TrackerResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TrackerCall::TransitionIssue {
            issue: issue.clone(),
            transition: transition.to_string(),
        });
        let allowed = match &state.allowed_transitions {
            None => true,
            Some(names) => names.iter().any(|n| n.eq_ignore_ascii_case(transition)),
        };
        let stored = state.issue_mut(issue)?;
        if !allowed {
            return Ok(false);
        }
        stored.status = transition.to_string();
        stored.resolved = true;
        stored.comments.push(comment.to_string());
        Ok(true)
    }
}
