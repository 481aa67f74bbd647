//! Request bodies and response parsing for the Jira REST v2 API.

use serde_json::{json, Map, Value};
use triage_core::{IssueKey, NewIssue};

use crate::error::{JiraError, Result};

/// Link type used for issues filed together in one run.
pub const RELATES_LINK: &str = "Relates";

/// `fields` object for `POST /issue`.
pub fn create_issue(issue: &NewIssue, assignee: Option<&str>, epic_link_field: &str) -> Value {
    let mut fields = Map::new();
    fields.insert("project".into(), json!({ "key": issue.project }));
    fields.insert("summary".into(), json!(issue.summary));
    fields.insert("description".into(), json!(issue.description));
    fields.insert("issuetype".into(), json!({ "name": issue.issue_type.as_str() }));

    if !issue.labels.is_empty() {
        fields.insert("labels".into(), json!(issue.labels));
    }
    if !issue.components.is_empty() {
        let components: Vec<Value> = issue
            .components
            .iter()
            .map(|name| json!({ "name": name }))
            .collect();
        fields.insert("components".into(), Value::Array(components));
    }
    if let Some(epic) = &issue.epic {
        fields.insert(epic_link_field.to_string(), json!(epic));
    }
    if let Some(version) = &issue.affects_version {
        fields.insert("versions".into(), json!([{ "name": version }]));
    }
    if let Some(name) = assignee {
        fields.insert("assignee".into(), json!({ "name": name }));
    }
    if let Some(priority) = issue.priority {
        fields.insert("priority".into(), json!({ "name": priority.as_str() }));
    }
    if let Some(level) = &issue.security_level {
        fields.insert("security".into(), json!({ "name": level }));
    }

    json!({ "fields": fields })
}

pub fn search(jql: &str, start_at: usize, max_results: usize) -> Value {
    json!({
        "jql": jql,
        "startAt": start_at,
        "maxResults": max_results,
        "fields": ["key"],
    })
}

/// Keys from a search response, plus the reported total.
pub fn search_page(response: &Value) -> Result<(Vec<IssueKey>, usize)> {
    let issues = response
        .get("issues")
        .and_then(Value::as_array)
        .ok_or_else(|| JiraError::InvalidResponse("search response has no issues".to_string()))?;
    let keys = issues
        .iter()
        .map(|issue| {
            issue
                .get("key")
                .and_then(Value::as_str)
                .map(IssueKey::new)
                .ok_or_else(|| JiraError::InvalidResponse("search result without key".to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    let total = response
        .get("total")
        .and_then(Value::as_u64)
        .map_or(keys.len(), |t| t as usize);
    Ok((keys, total))
}

pub fn created_key(response: &Value) -> Result<IssueKey> {
    response
        .get("key")
        .and_then(Value::as_str)
        .map(IssueKey::new)
        .ok_or_else(|| JiraError::InvalidResponse("create response has no key".to_string()))
}

pub fn comment(body: &str) -> Value {
    json!({ "body": body })
}

/// `update` body that adds labels; Jira keeps labels as a set.
pub fn add_labels(labels: &[String]) -> Value {
    let ops: Vec<Value> = labels.iter().map(|l| json!({ "add": l })).collect();
    json!({ "update": { "labels": ops } })
}

pub fn relate(a: &IssueKey, b: &IssueKey) -> Value {
    json!({
        "type": { "name": RELATES_LINK },
        "inwardIssue": { "key": a.as_str() },
        "outwardIssue": { "key": b.as_str() },
    })
}

/// Id of the transition called `name` (case-insensitive), if offered.
pub fn find_transition(response: &Value, name: &str) -> Result<Option<String>> {
    let transitions = response
        .get("transitions")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            JiraError::InvalidResponse("transitions response has no transitions".to_string())
        })?;
    Ok(transitions
        .iter()
        .find(|t| {
            t.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|t| t.get("id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
}

pub fn transition(id: &str, comment: &str) -> Value {
    json!({
        "transition": { "id": id },
        "update": { "comment": [ { "add": { "body": comment } } ] },
    })
}

/// Username of the first user returned by `/user/search`.
pub fn first_user_name(response: &Value) -> Option<String> {
    response
        .as_array()?
        .first()?
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::Priority;

    #[test]
    fn test_create_issue_minimal_fields() {
        let issue = NewIssue::bug("OCPBUGS", "Failure in job", "details");
        let body = create_issue(&issue, None, "customfield_1");
        let fields = &body["fields"];

        assert_eq!(fields["project"]["key"], "OCPBUGS");
        assert_eq!(fields["issuetype"]["name"], "Bug");
        assert!(fields.get("labels").is_none());
        assert!(fields.get("assignee").is_none());
        assert!(fields.get("customfield_1").is_none());
    }

    #[test]
    fn test_create_issue_full_metadata() {
        let issue = NewIssue {
            components: vec!["Installer".to_string()],
            epic: Some("OCPBUGS-1".to_string()),
            labels: vec!["job".to_string(), "install".to_string()],
            affects_version: Some("4.16".to_string()),
            priority: Some(Priority::Critical),
            security_level: Some("Red Hat Employee".to_string()),
            ..NewIssue::bug("OCPBUGS", "s", "d")
        };
        let body = create_issue(&issue, Some("jdoe"), "customfield_1");
        let fields = &body["fields"];

        assert_eq!(fields["components"][0]["name"], "Installer");
        assert_eq!(fields["customfield_1"], "OCPBUGS-1");
        assert_eq!(fields["labels"], json!(["job", "install"]));
        assert_eq!(fields["versions"][0]["name"], "4.16");
        assert_eq!(fields["assignee"]["name"], "jdoe");
        assert_eq!(fields["priority"]["name"], "Critical");
        assert_eq!(fields["security"]["name"], "Red Hat Employee");
    }

    #[test]
    fn test_search_page_parsing() {
        let response = json!({
            "total": 3,
            "issues": [ { "key": "P-1" }, { "key": "P-2" } ]
        });
        let (keys, total) = search_page(&response).unwrap();
        assert_eq!(keys, vec![IssueKey::new("P-1"), IssueKey::new("P-2")]);
        assert_eq!(total, 3);

        assert!(search_page(&json!({})).is_err());
    }

    #[test]
    fn test_find_transition_is_case_insensitive() {
        let response = json!({
            "transitions": [
                { "id": "11", "name": "In Progress" },
                { "id": 31, "name": "CLOSED" }
            ]
        });
        assert_eq!(find_transition(&response, "Closed").unwrap(), Some("31".to_string()));
        assert_eq!(find_transition(&response, "Verified").unwrap(), None);
    }

    #[test]
    fn test_add_labels_uses_update_operations() {
        let body = add_labels(&["passed-since-filed".to_string()]);
        assert_eq!(body["update"]["labels"][0]["add"], "passed-since-filed");
    }

    #[test]
    fn test_first_user_name() {
        assert_eq!(
            first_user_name(&json!([{ "name": "jdoe", "emailAddress": "jdoe@example.com" }])),
            Some("jdoe".to_string())
        );
        assert_eq!(first_user_name(&json!([])), None);
    }
}
