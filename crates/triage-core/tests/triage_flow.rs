//! End-to-end triage runs against the in-memory tracker.

use serde_json::json;
use triage_core::fakes::{MemoryTracker, TrackerCall};
use triage_core::tracker::{IGNORE_PASSING_LABEL, PASSED_LABEL, TOOL_LABEL};
use triage_core::{
    run_triage, Configuration, Failure, FailureRule, IssueQuery, IssueTracker, JobContext,
    ReportOptions, Rule, RuleDefaults, TransitionMap,
};

fn rule(value: serde_json::Value) -> FailureRule {
    FailureRule::from_json(&value, &RuleDefaults::default()).expect("valid rule")
}

fn install_rule() -> FailureRule {
    rule(json!({
        "step": "install",
        "failure_type": "pod_failure",
        "classification": "infra",
        "jira_project": "OCPBUGS",
    }))
}

fn job() -> JobContext {
    JobContext::new("periodic-ci-e2e-aws", "1842").with_url("https://ci.example.com/1842")
}

#[tokio::test]
async fn single_install_failure_files_one_issue() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", vec![install_rule()]);

    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        vec![Failure::pod("install")],
    )
    .await;

    let created = tracker.created();
    assert_eq!(created.len(), 1);
    match &created[0] {
        TrackerCall::CreateIssue {
            project, labels, ..
        } => {
            assert_eq!(project, "OCPBUGS");
            for label in ["install", "pod_failure", TOOL_LABEL] {
                assert!(labels.contains(&label.to_string()), "missing {label}");
            }
        }
        other => panic!("expected CreateIssue, got {other:?}"),
    }
    assert_eq!(report.filing.filed.len(), 1);
    assert!(report.reconciliation.is_none());
    assert_eq!(report.exit_code, 0);
}

#[tokio::test]
async fn second_run_comments_instead_of_filing() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", vec![install_rule()]);
    let options = ReportOptions::default();

    let first = run_triage(
        &tracker,
        &config,
        &job(),
        &options,
        vec![Failure::pod("install")],
    )
    .await;
    let second = run_triage(
        &tracker,
        &config,
        &JobContext::new("periodic-ci-e2e-aws", "1843"),
        &options,
        vec![Failure::pod("install")],
    )
    .await;

    assert_eq!(tracker.created().len(), 1);
    assert!(second.filing.filed.is_empty());
    assert_eq!(second.filing.duplicates_updated[0].key, first.filing.filed[0].key);

    let issue = tracker.issue(&first.filing.filed[0].key).unwrap();
    assert!(issue.comments[0].contains("1843"));
}

#[tokio::test]
async fn fingerprint_labels_find_the_created_issue() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", vec![install_rule()]);
    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        vec![Failure::pod("install")],
    )
    .await;

    let found = tracker
        .search_issues(
            &IssueQuery::bugs("OCPBUGS")
                .unresolved()
                .with_labels(["periodic-ci-e2e-aws", "pod_failure", "install"]),
        )
        .await
        .unwrap();
    assert_eq!(found, vec![report.filing.filed[0].key.clone()]);
}

#[tokio::test]
async fn same_step_test_failures_file_one_issue_without_verbose() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", Vec::new());
    let failures = vec![
        Failure::test("e2e", "t1"),
        Failure::test("e2e", "t2"),
        Failure::test("e2e", "t3"),
    ];

    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        failures,
    )
    .await;

    assert_eq!(report.pairs, 3);
    assert_eq!(tracker.created().len(), 1);
    assert_eq!(report.filing.filed.len(), 1);
    assert!(report.filing.duplicates_updated.is_empty());
    assert!(!tracker
        .calls()
        .iter()
        .any(|c| matches!(c, TrackerCall::Comment { .. })));
    assert!(tracker
        .issue(&report.filing.filed[0].key)
        .unwrap()
        .comments
        .is_empty());
}

#[tokio::test]
async fn ticket_limit_caps_new_issues_but_not_duplicate_comments() {
    let tracker = MemoryTracker::new();
    let job = job();
    // A duplicate of the fifth failure already exists.
    let existing = tracker.seed_issue(
        "DEFAULT",
        &["periodic-ci-e2e-aws", "test_failure", "e2e", "t5"],
        false,
    );
    let config = Configuration::new("DEFAULT", Vec::new());
    let options = ReportOptions {
        verbose_test_failure_reporting: true,
        max_tickets: Some(2),
        ..Default::default()
    };
    let failures = (1..=6)
        .map(|i| Failure::test("e2e", format!("t{i}")))
        .collect();

    let report = run_triage(&tracker, &config, &job, &options, failures).await;

    assert_eq!(tracker.created().len(), 2);
    assert_eq!(report.filing.filed.len(), 2);
    assert!(report.filing.ticket_limit_reached);
    assert_eq!(report.filing.skipped_by_ticket_limit, 3);
    assert_eq!(report.filing.duplicates_updated.len(), 1);
    assert_eq!(report.filing.duplicates_updated[0].key, existing);

    // No creation is attempted after the second one.
    let calls = tracker.calls();
    let last_create = calls
        .iter()
        .rposition(|c| matches!(c, TrackerCall::CreateIssue { .. }))
        .unwrap();
    let second_create = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, TrackerCall::CreateIssue { .. }))
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(last_create, second_create);
}

#[tokio::test]
async fn ticket_limit_needs_verbose_reporting() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", Vec::new());
    let options = ReportOptions {
        max_tickets: Some(1),
        ..Default::default()
    };
    let failures = vec![Failure::pod("a"), Failure::pod("b"), Failure::pod("c")];

    let report = run_triage(&tracker, &config, &job(), &options, failures).await;

    assert_eq!(report.filing.filed.len(), 3);
    assert!(!report.filing.ticket_limit_reached);
}

#[tokio::test]
async fn calls_follow_pair_order() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new(
        "DEFAULT",
        vec![
            rule(json!({ "step": "gather-*", "failure_type": "all",
                         "classification": "gather", "jira_project": "GATHER" })),
            rule(json!({ "step": "gather-extra", "failure_type": "all",
                         "classification": "extra", "jira_project": "EXTRA" })),
        ],
    );

    run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        vec![Failure::pod("gather-extra"), Failure::pod("install")],
    )
    .await;

    let projects: Vec<String> = tracker
        .created()
        .into_iter()
        .filter_map(|c| match c {
            TrackerCall::CreateIssue { project, .. } => Some(project),
            _ => None,
        })
        .collect();
    assert_eq!(projects, vec!["EXTRA", "GATHER", "DEFAULT"]);

    let relates = tracker
        .calls()
        .into_iter()
        .filter(|c| matches!(c, TrackerCall::RelateIssues { .. }))
        .count();
    assert_eq!(relates, 3);
}

#[tokio::test]
async fn priority_group_files_only_the_winner() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new(
        "DEFAULT",
        vec![
            rule(json!({ "step": "install", "failure_type": "all", "classification": "broad",
                         "jira_project": "LOW", "group": { "name": "install", "priority": 2 } })),
            rule(json!({ "step": "install", "failure_type": "all", "classification": "narrow",
                         "jira_project": "HIGH", "group": { "name": "install", "priority": 1 } })),
        ],
    );

    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        vec![Failure::pod("install")],
    )
    .await;

    assert_eq!(report.pairs, 1);
    assert_eq!(report.filing.filed[0].project, "HIGH");
}

#[tokio::test]
async fn ignored_failures_take_the_passing_path() {
    let tracker = MemoryTracker::new();
    let open = tracker.seed_issue("DEFAULT", &["periodic-ci-e2e-aws", TOOL_LABEL], false);
    let config = Configuration::new(
        "DEFAULT",
        vec![rule(json!({ "step": "gather-*", "failure_type": "all",
                          "classification": "noise", "jira_project": "DEFAULT",
                          "ignore": true }))],
    );
    let options = ReportOptions {
        fail_with_pod_failures: true,
        ..Default::default()
    };

    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &options,
        vec![Failure::pod("gather-must-gather")],
    )
    .await;

    assert!(report.passed());
    assert_eq!(report.ignored.len(), 1);
    assert_eq!(report.exit_code, 0);
    assert!(tracker.created().is_empty());
    let reconciliation = report.reconciliation.expect("passing path ran");
    assert_eq!(reconciliation.annotated, vec![open.clone()]);
    assert!(tracker.issue(&open).unwrap().labels.contains(PASSED_LABEL));
}

#[tokio::test]
async fn passing_runs_label_once() {
    let tracker = MemoryTracker::new();
    let open = tracker.seed_issue("DEFAULT", &["periodic-ci-e2e-aws", TOOL_LABEL], false);
    let skipped = tracker.seed_issue(
        "DEFAULT",
        &["periodic-ci-e2e-aws", TOOL_LABEL, IGNORE_PASSING_LABEL],
        false,
    );
    let config = Configuration::new("DEFAULT", Vec::new());
    let options = ReportOptions::default();

    run_triage(&tracker, &config, &job(), &options, Vec::new()).await;
    run_triage(&tracker, &config, &job(), &options, Vec::new()).await;

    let issue = tracker.issue(&open).unwrap();
    assert_eq!(issue.labels.iter().filter(|l| *l == PASSED_LABEL).count(), 1);
    assert!(tracker.issue(&skipped).unwrap().comments.is_empty());
}

#[tokio::test]
async fn passing_notification_can_be_disabled() {
    let tracker = MemoryTracker::new();
    let open = tracker.seed_issue("DEFAULT", &["periodic-ci-e2e-aws", TOOL_LABEL], false);
    let mut config = Configuration::new("DEFAULT", Vec::new());
    config.success_rules = vec![Rule::for_project("SIGNAL")];
    let options = ReportOptions {
        notify_passing: false,
        ..Default::default()
    };

    let report = run_triage(&tracker, &config, &job(), &options, Vec::new()).await;

    assert!(tracker.issue(&open).unwrap().comments.is_empty());
    let reconciliation = report.reconciliation.unwrap();
    assert!(reconciliation.annotated.is_empty());
    assert_eq!(reconciliation.success_issues.len(), 1);
}

#[tokio::test]
async fn transition_map_closes_passing_issues() {
    let tracker = MemoryTracker::new().with_transitions(["CLOSED"]);
    let open = tracker.seed_issue("DEFAULT", &["periodic-ci-e2e-aws", TOOL_LABEL], false);
    let mut config = Configuration::new("DEFAULT", Vec::new());
    config.transition_map = Some(TransitionMap::default());

    let report = run_triage(&tracker, &config, &job(), &ReportOptions::default(), Vec::new()).await;

    let reconciliation = report.reconciliation.unwrap();
    assert_eq!(reconciliation.transitioned.len(), 1);
    assert!(tracker.issue(&open).unwrap().resolved);
}

#[tokio::test]
async fn exit_code_reflects_surviving_failures() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", Vec::new());
    let options = ReportOptions {
        fail_with_test_failures: true,
        ..Default::default()
    };

    let pods = run_triage(&tracker, &config, &job(), &options, vec![Failure::pod("install")]).await;
    let tests = run_triage(
        &tracker,
        &config,
        &job(),
        &options,
        vec![Failure::test("e2e", "dns")],
    )
    .await;

    assert_eq!(pods.exit_code, 0);
    assert_eq!(tests.exit_code, 1);
}

#[tokio::test]
async fn report_serializes_to_json() {
    let tracker = MemoryTracker::new();
    let config = Configuration::new("DEFAULT", vec![install_rule()]);
    let report = run_triage(
        &tracker,
        &config,
        &job(),
        &ReportOptions::default(),
        vec![Failure::pod("install")],
    )
    .await;

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["job"]["name"], "periodic-ci-e2e-aws");
    assert_eq!(value["failures"][0]["failure_type"], "pod_failure");
    assert_eq!(value["filing"]["filed"][0]["project"], "OCPBUGS");
}
