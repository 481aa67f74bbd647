//! JQL rendering for [`IssueQuery`].

use triage_core::tracker::{IssueQuery, Resolution};

/// Quote a JQL string literal.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render `query` as JQL. Each required label is its own `labels = ...`
/// clause so that all of them must be present.
pub fn render(query: &IssueQuery) -> String {
    let mut clauses = vec![
        format!("project = {}", quote(&query.project)),
        format!("issuetype = {}", quote(query.issue_type.as_str())),
    ];
    match query.resolution {
        Resolution::Unresolved => clauses.push("resolution = Unresolved".to_string()),
        Resolution::Resolved => clauses.push("resolution != Unresolved".to_string()),
        Resolution::Any => {}
    }
    clauses.extend(query.labels.iter().map(|l| format!("labels = {}", quote(l))));
    clauses.extend(
        query
            .excluded_labels
            .iter()
            .map(|l| format!("labels != {}", quote(l))),
    );

    let mut jql = clauses.join(" AND ");
    if query.limit.is_some() {
        jql.push_str(" ORDER BY created DESC");
    }
    jql
}
