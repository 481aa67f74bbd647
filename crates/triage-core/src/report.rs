//! One triage run, end to end.
//!
//! classify -> priority filter -> file (or reconcile when nothing survived).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::classifier::{classify_failures, filter_priority_rule_failure_pairs};
use crate::config::Configuration;
use crate::failure::{Failure, FailureKind};
use crate::filer::{FilingReport, IssueFiler};
use crate::job::{JobContext, ReportOptions};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::tracker::IssueTracker;

/// Outcome of a triage run, suitable for printing as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageReport {
    pub job: JobContext,
    pub generated_at: DateTime<Utc>,
    /// Failures that survived ignore rules.
    pub failures: Vec<Failure>,
    pub ignored: Vec<Failure>,
    /// Rule/failure pairs left after priority filtering.
    pub pairs: usize,
    pub filing: FilingReport,
    /// Present only on the passing path.
    pub reconciliation: Option<ReconcileReport>,
    /// Process exit status requested by the fail-with options.
    pub exit_code: i32,
}

impl TriageReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.filing.errors.len()
            + self
                .reconciliation
                .as_ref()
                .map_or(0, |r| r.errors.len())
    }
}

/// Triage `failures` for one job against the configured rules.
#[instrument(skip_all, fields(job = %job.name, build = %job.build_id))]
pub async fn run_triage(
    tracker: &dyn IssueTracker,
    config: &Configuration,
    job: &JobContext,
    options: &ReportOptions,
    mut failures: Vec<Failure>,
) -> TriageReport {
    let pairs = classify_failures(&mut failures, &config.failure_rules, &config.default_project);
    let pairs = filter_priority_rule_failure_pairs(pairs);

    let (ignored, failures): (Vec<Failure>, Vec<Failure>) =
        failures.into_iter().partition(Failure::is_ignored);
    info!(
        failures = failures.len(),
        ignored = ignored.len(),
        pairs = pairs.len(),
        "classified failures"
    );

    let mut filing = FilingReport::default();
    let mut reconciliation = None;

    if failures.is_empty() {
        let reconciler = Reconciler::new(tracker, job, &config.default_project)
            .with_transitions(config.transition_map.as_ref());
        let mut report = ReconcileReport::default();
        if options.notify_passing {
            reconciler.reconcile(&mut report).await;
        }
        reconciler
            .file_success_issues(&config.success_rules, options, &mut report)
            .await;
        reconciliation = Some(report);
    } else {
        filing = IssueFiler::new(tracker, job, options).file(&pairs).await;
        info!(
            filed = filing.filed.len(),
            duplicates = filing.duplicates_updated.len(),
            errors = filing.errors.len(),
            "filing complete"
        );
    }

    let exit_code = exit_code(&failures, options);

    TriageReport {
        job: job.clone(),
        generated_at: Utc::now(),
        failures,
        ignored,
        pairs: pairs.len(),
        filing,
        reconciliation,
        exit_code,
    }
}

/// Non-zero when a surviving failure has a kind the options fail on.
pub fn exit_code(failures: &[Failure], options: &ReportOptions) -> i32 {
    let fails = failures.iter().any(|f| match f.kind {
        FailureKind::TestFailure => options.fail_with_test_failures,
        FailureKind::PodFailure => options.fail_with_pod_failures,
    });
    i32::from(fails)
}
