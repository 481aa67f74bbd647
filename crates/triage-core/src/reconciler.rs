//! Passing-job reconciliation.
//!
//! When a job finishes without surviving failures, issues this tool filed
//! earlier for the job are either annotated as passing or, with a transition
//! map configured, moved straight to the mapped workflow state.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TransitionMap;
use crate::filer::FilingError;
use crate::job::{JobContext, ReportOptions};
use crate::rule::{dedup_preserving_order, Rule};
use crate::tracker::{
    IssueKey, IssueQuery, IssueTracker, NewIssue, IGNORE_PASSING_LABEL, PASSED_LABEL,
    SUCCESS_LABEL, TOOL_LABEL,
};

/// An issue moved through a workflow transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionedIssue {
    pub key: IssueKey,
    pub transition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Issues commented on and labeled as passing.
    pub annotated: Vec<IssueKey>,
    pub transitioned: Vec<TransitionedIssue>,
    /// Informational issues filed for success rules.
    pub success_issues: Vec<IssueKey>,
    pub errors: Vec<FilingError>,
}

/// Handles the passing-job path for one job.
pub struct Reconciler<'a> {
    tracker: &'a dyn IssueTracker,
    job: &'a JobContext,
    default_project: &'a str,
    transitions: Option<&'a TransitionMap>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        job: &'a JobContext,
        default_project: &'a str,
    ) -> Self {
        Self {
            tracker,
            job,
            default_project,
            transitions: None,
        }
    }

    /// Close issues through the mapped transition instead of labeling them.
    pub fn with_transitions(mut self, transitions: Option<&'a TransitionMap>) -> Self {
        self.transitions = transitions;
        self
    }

    /// Open bugs this tool filed for the job, minus opted-out ones.
    pub fn passing_query(&self) -> IssueQuery {
        IssueQuery::bugs(self.default_project)
            .unresolved()
            .with_labels([self.job.name.as_str(), TOOL_LABEL])
            .without_label(IGNORE_PASSING_LABEL)
    }

    /// Annotate or transition every open issue filed for this job.
    pub async fn reconcile(&self, report: &mut ReconcileReport) {
        let open = match self.tracker.search_issues(&self.passing_query()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(job = %self.job.name, error = %e, "search for open issues failed");
                report.errors.push(FilingError {
                    subject: self.job.name.clone(),
                    message: format!("open issue search failed: {e}"),
                });
                return;
            }
        };
        info!(job = %self.job.name, count = open.len(), "job passed, reconciling open issues");

        for key in &open {
            if let Some(map) = self.transitions {
                let transition = map.transition_for(key.project());
                if self.transition(key, transition, report).await {
                    continue;
                }
            }
            self.annotate(key, report).await;
        }
    }

    async fn transition(
        &self,
        key: &IssueKey,
        transition: &str,
        report: &mut ReconcileReport,
    ) -> bool {
        let comment = format!(
            "The {} job passed in build {}. Closing this issue automatically; reopen it if the \
             failure comes back.",
            self.job.link_markup(),
            self.job.build_id
        );
        match self.tracker.transition_issue(key, transition, &comment).await {
            Ok(true) => {
                info!(issue = %key, transition, "transitioned passing issue");
                report.transitioned.push(TransitionedIssue {
                    key: key.clone(),
                    transition: transition.to_string(),
                });
                true
            }
            Ok(false) => {
                warn!(issue = %key, transition, "transition not available, annotating instead");
                false
            }
            Err(e) => {
                warn!(
                    issue = %key,
                    transition,
                    error = %e,
                    "transition failed, annotating instead"
                );
                false
            }
        }
    }

    async fn annotate(&self, key: &IssueKey, report: &mut ReconcileReport) {
        let body = format!(
            "The {} job recently passed (build {}). Please verify whether this issue is still \
             relevant.",
            self.job.link_markup(),
            self.job.build_id
        );
        if let Err(e) = self.tracker.comment(key, &body).await {
            warn!(issue = %key, error = %e, "passing comment failed");
            report.errors.push(FilingError {
                subject: key.to_string(),
                message: format!("passing comment failed: {e}"),
            });
            return;
        }
        match self
            .tracker
            .add_labels(key, &[PASSED_LABEL.to_string()])
            .await
        {
            Ok(()) => {
                info!(issue = %key, "annotated passing issue");
                report.annotated.push(key.clone());
            }
            Err(e) => {
                warn!(issue = %key, error = %e, "adding passed label failed");
                report.errors.push(FilingError {
                    subject: key.to_string(),
                    message: format!("adding passed label failed: {e}"),
                });
            }
        }
    }

    /// File one closed informational issue per success rule.
    pub async fn file_success_issues(
        &self,
        rules: &[Rule],
        options: &ReportOptions,
        report: &mut ReconcileReport,
    ) {
        for rule in rules {
            let issue = self.success_issue(rule, options);
            match self.tracker.create_issue(issue).await {
                Ok(key) => {
                    info!(issue = %key, project = %rule.project, "filed success issue");
                    report.success_issues.push(key);
                }
                Err(e) => {
                    warn!(project = %rule.project, error = %e, "success issue creation failed");
                    report.errors.push(FilingError {
                        subject: format!("{} success -> {}", self.job.name, rule.project),
                        message: format!("success issue creation failed: {e}"),
                    });
                }
            }
        }
    }

    fn success_issue(&self, rule: &Rule, options: &ReportOptions) -> NewIssue {
        let mut labels = vec![
            self.job.name.clone(),
            SUCCESS_LABEL.to_string(),
            TOOL_LABEL.to_string(),
        ];
        labels.extend(rule.additional_labels.iter().cloned());
        labels.extend(options.additional_labels.iter().cloned());

        let description = format!(
            "*Job:* {}\n*Build ID:* {}\n\nThe job passed. This issue was filed automatically by \
             {TOOL_LABEL} and closed on creation.",
            self.job.link_markup(),
            self.job.build_id
        );

        NewIssue {
            components: rule.components.clone(),
            epic: rule.epic.clone(),
            labels: dedup_preserving_order(labels),
            affects_version: rule.affects_version.clone(),
            assignee: rule.assignee.clone(),
            priority: rule.priority,
            security_level: rule.security_level.clone(),
            close: true,
            ..NewIssue::bug(&rule.project, format!("{} passed", self.job.name), description)
        }
    }
}
