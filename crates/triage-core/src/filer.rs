//! Issue filing with duplicate suppression.
//!
//! For each surviving rule/failure pair the filer searches for open issues
//! with the same fingerprint. Duplicates get a comment; otherwise a new
//! issue is created. Newly filed issues from one run are related to each
//! other at the end.
//!
//! Calls are made one at a time in pair order. A tracker error on one pair
//! is recorded and the filer moves on to the next pair. Pairs sharing a
//! fingerprint are handled once per run; without verbose test reporting
//! every failed test in a step maps to the same issue.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::RuleFailurePair;
use crate::failure::FailureKind;
use crate::fingerprint::Fingerprint;
use crate::job::{JobContext, ReportOptions};
use crate::rule::dedup_preserving_order;
use crate::tracker::{IssueKey, IssueTracker, NewIssue, TOOL_LABEL};

/// An issue created by this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiledIssue {
    pub key: IssueKey,
    pub project: String,
    pub step: String,
    pub kind: FailureKind,
    pub test_name: Option<String>,
    pub classification: String,
}

/// An existing issue that received a duplicate notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateUpdate {
    pub key: IssueKey,
    pub step: String,
    pub kind: FailureKind,
    pub test_name: Option<String>,
}

/// A tracker call that failed; the run continued past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingError {
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingReport {
    pub filed: Vec<FiledIssue>,
    pub duplicates_updated: Vec<DuplicateUpdate>,
    pub related: Vec<(IssueKey, IssueKey)>,
    pub errors: Vec<FilingError>,
    pub ticket_limit_reached: bool,
    pub skipped_by_ticket_limit: usize,
    /// Pairs folded into an earlier pair with the same fingerprint.
    #[serde(default)]
    pub collapsed: usize,
}

/// Files issues for classified failures of one job.
pub struct IssueFiler<'a> {
    tracker: &'a dyn IssueTracker,
    job: &'a JobContext,
    options: &'a ReportOptions,
}

impl<'a> IssueFiler<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        job: &'a JobContext,
        options: &'a ReportOptions,
    ) -> Self {
        Self {
            tracker,
            job,
            options,
        }
    }

    /// Process every pair in order and relate the issues filed along the way.
    pub async fn file(&self, pairs: &[RuleFailurePair]) -> FilingReport {
        let verbose = self.options.verbose_test_failure_reporting;
        let limit = self.options.ticket_limit();
        let mut report = FilingReport::default();
        let mut handled = HashSet::new();

        for pair in pairs {
            let fingerprint = Fingerprint::for_pair(pair, &self.job.name, verbose);
            let subject = describe(pair, &fingerprint);
            if !handled.insert(fingerprint.clone()) {
                debug!(pair = %subject, "fingerprint already handled this run");
                report.collapsed += 1;
                continue;
            }

            let duplicates = match self
                .tracker
                .search_issues(&fingerprint.open_duplicates())
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(pair = %subject, error = %e, "duplicate search failed, skipping");
                    report.errors.push(FilingError {
                        subject,
                        message: format!("duplicate search failed: {e}"),
                    });
                    continue;
                }
            };

            if !duplicates.is_empty() {
                self.comment_duplicates(pair, &fingerprint, &duplicates, &mut report)
                    .await;
                continue;
            }

            if let Some(max) = limit {
                if report.filed.len() >= max {
                    if !report.ticket_limit_reached {
                        warn!(
                            limit = max,
                            "ticket limit of {} reached, no further issues will be created", max
                        );
                    }
                    report.ticket_limit_reached = true;
                    report.skipped_by_ticket_limit += 1;
                    continue;
                }
            }

            match self.create(pair, &fingerprint).await {
                Ok(key) => {
                    info!(issue = %key, pair = %subject, "filed new issue");
                    report.filed.push(FiledIssue {
                        key,
                        project: fingerprint.project.clone(),
                        step: pair.failure.step.clone(),
                        kind: pair.failure.kind,
                        test_name: fingerprint.test_name.clone(),
                        classification: pair.rule.classification.clone(),
                    });
                }
                Err(e) => {
                    warn!(pair = %subject, error = %e, "issue creation failed");
                    report.errors.push(FilingError {
                        subject,
                        message: format!("issue creation failed: {e}"),
                    });
                }
            }
        }

        self.relate_filed(&mut report).await;
        report
    }

    async fn comment_duplicates(
        &self,
        pair: &RuleFailurePair,
        fingerprint: &Fingerprint,
        duplicates: &[IssueKey],
        report: &mut FilingReport,
    ) {
        let body = self.duplicate_comment(pair, fingerprint);
        for key in duplicates {
            match self.tracker.comment(key, &body).await {
                Ok(()) => {
                    info!(issue = %key, step = %pair.failure.step, "commented on duplicate issue");
                    report.duplicates_updated.push(DuplicateUpdate {
                        key: key.clone(),
                        step: pair.failure.step.clone(),
                        kind: pair.failure.kind,
                        test_name: fingerprint.test_name.clone(),
                    });
                }
                Err(e) => {
                    warn!(issue = %key, error = %e, "duplicate comment failed");
                    report.errors.push(FilingError {
                        subject: key.to_string(),
                        message: format!("duplicate comment failed: {e}"),
                    });
                }
            }
        }
    }

    async fn create(
        &self,
        pair: &RuleFailurePair,
        fingerprint: &Fingerprint,
    ) -> crate::error::TrackerResult<IssueKey> {
        let history = self.resolved_history_line(fingerprint).await;
        let rule = &pair.rule;

        let mut labels = fingerprint.labels();
        labels.push(TOOL_LABEL.to_string());
        labels.extend(rule.additional_labels.iter().cloned());
        labels.extend(self.options.additional_labels.iter().cloned());

        let issue = NewIssue {
            components: rule.components.clone(),
            epic: rule.epic.clone(),
            attachments: pair.failure.evidence_path.iter().cloned().collect(),
            labels: dedup_preserving_order(labels),
            affects_version: rule.affects_version.clone(),
            assignee: rule.assignee.clone(),
            priority: rule.priority,
            security_level: rule.security_level.clone(),
            ..NewIssue::bug(
                &rule.project,
                self.summary(fingerprint),
                self.description(pair, fingerprint, history.as_deref()),
            )
        };
        self.tracker.create_issue(issue).await
    }

    /// Link to recently resolved issues with the same fingerprint, if any.
    async fn resolved_history_line(&self, fingerprint: &Fingerprint) -> Option<String> {
        let query = fingerprint.resolved_history();
        match self.tracker.search_issues(&query).await {
            Ok(found) if found.is_empty() => None,
            Ok(found) => Some(format!(
                "*Recently resolved issues with this failure:* {} ([full resolved history|{}])",
                join_keys(&found),
                self.tracker.search_url(&query)
            )),
            Err(e) => {
                warn!(error = %e, "resolved issue lookup failed, omitting history link");
                None
            }
        }
    }

    async fn relate_filed(&self, report: &mut FilingReport) {
        if report.filed.len() < 2 {
            return;
        }
        let keys: Vec<IssueKey> = report.filed.iter().map(|f| f.key.clone()).collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                match self.tracker.relate_issues(a, b).await {
                    Ok(true) => report.related.push((a.clone(), b.clone())),
                    Ok(false) => warn!(a = %a, b = %b, "tracker refused to relate issues"),
                    Err(e) => {
                        warn!(a = %a, b = %b, error = %e, "relating issues failed");
                        report.errors.push(FilingError {
                            subject: format!("{a} <-> {b}"),
                            message: format!("relate failed: {e}"),
                        });
                    }
                }
            }
        }
    }

    fn summary(&self, fingerprint: &Fingerprint) -> String {
        match &fingerprint.test_name {
            Some(test) => format!(
                "{} failed in {} ({})",
                test, self.job.name, fingerprint.step
            ),
            None => format!(
                "Failure in {}: {} in step {}",
                self.job.name, fingerprint.kind, fingerprint.step
            ),
        }
    }

    fn details(&self, pair: &RuleFailurePair, fingerprint: &Fingerprint) -> String {
        let mut details = format!(
            "*Job:* {}\n*Build ID:* {}\n*Classification:* {}\n*Failure type:* {}\n*Step:* {}\n",
            self.job.link_markup(),
            self.job.build_id,
            pair.rule.classification,
            pair.failure.kind,
            pair.failure.step,
        );
        if let Some(test) = &fingerprint.test_name {
            details.push_str(&format!("*Test:* {test}\n"));
        }
        details
    }

    fn description(
        &self,
        pair: &RuleFailurePair,
        fingerprint: &Fingerprint,
        history: Option<&str>,
    ) -> String {
        let mut description = self.details(pair, fingerprint);
        if let Some(line) = history {
            description.push('\n');
            description.push_str(line);
            description.push('\n');
        }
        description.push_str(&format!(
            "\nThis issue was filed automatically by {TOOL_LABEL}. Later failures with the same \
             job, step and failure type are added here as comments."
        ));
        description
    }

    fn duplicate_comment(&self, pair: &RuleFailurePair, fingerprint: &Fingerprint) -> String {
        format!(
            "A duplicate failure was identified in a recent run of the {} job.\n\n{}",
            self.job.name,
            self.details(pair, fingerprint)
        )
    }
}

fn join_keys(keys: &[IssueKey]) -> String {
    keys.iter()
        .map(IssueKey::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(pair: &RuleFailurePair, fingerprint: &Fingerprint) -> String {
    match &fingerprint.test_name {
        Some(test) => format!(
            "{}/{}/{} -> {}",
            pair.failure.step, pair.failure.kind, test, fingerprint.project
        ),
        None => format!(
            "{}/{} -> {}",
            pair.failure.step, pair.failure.kind, fingerprint.project
        ),
    }
}
