//! Queries built by the triage engine render to the JQL Jira expects.

use jira_tracker::{jql, JiraClient, JiraConfig, RetryPolicy};
use triage_core::failure_rule::FailureRule;
use triage_core::reconciler::Reconciler;
use triage_core::{Failure, Fingerprint, IssueTracker, JobContext, RuleFailurePair};

fn fingerprint(failure: Failure, verbose: bool) -> Fingerprint {
    let pair = RuleFailurePair {
        rule: FailureRule::default_rule("OCPBUGS"),
        failure,
    };
    Fingerprint::for_pair(&pair, "periodic-ci-e2e-aws", verbose)
}

#[test]
fn duplicate_search_matches_every_fingerprint_label() {
    let fp = fingerprint(Failure::test("e2e", "dns-resolves"), true);
    let jql = jql::render(&fp.open_duplicates());

    assert_eq!(
        jql,
        concat!(
            r#"project = "OCPBUGS" AND issuetype = "Bug" AND resolution = Unresolved"#,
            r#" AND labels = "periodic-ci-e2e-aws" AND labels = "test_failure""#,
            r#" AND labels = "e2e" AND labels = "dns-resolves""#,
        )
    );
}

#[test]
fn resolved_history_is_newest_first() {
    let fp = fingerprint(Failure::pod("install"), false);
    let jql = jql::render(&fp.resolved_history());

    assert!(jql.contains("resolution != Unresolved"));
    assert!(jql.contains(r#"labels = "install""#));
    assert!(jql.ends_with("ORDER BY created DESC"));
}

#[test]
fn passing_search_excludes_opted_out_issues() {
    let tracker = JiraClient::new(
        JiraConfig::new("https://issues.example.com", "token").with_retry(RetryPolicy::none()),
    )
    .unwrap();
    let job = JobContext::new("periodic-ci-e2e-aws", "1");
    let query = Reconciler::new(&tracker, &job, "OCPBUGS").passing_query();
    let jql = jql::render(&query);

    assert!(jql.contains(r#"labels = "periodic-ci-e2e-aws""#));
    assert!(jql.contains(r#"labels = "ci-triage""#));
    assert!(jql.contains(r#"labels != "ignore-passing-notification""#));

    let url = tracker.search_url(&query);
    assert!(url.starts_with("https://issues.example.com/issues/?jql=project"));
}
