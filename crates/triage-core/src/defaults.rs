//! Environment-level defaults referenced by `!default` rule values.
//!
//! Rule construction never reads the process environment directly; it asks a
//! [`DefaultsProvider`]. [`RuleDefaults::from_env`] snapshots the well-known
//! environment variables, tests build a [`RuleDefaults`] literal instead.

use serde::{Deserialize, Serialize};

pub const ENV_DEFAULT_PROJECT: &str = "TRIAGE_DEFAULT_JIRA_PROJECT";
pub const ENV_DEFAULT_EPIC: &str = "TRIAGE_DEFAULT_JIRA_EPIC";
pub const ENV_DEFAULT_COMPONENT: &str = "TRIAGE_DEFAULT_JIRA_COMPONENT";
pub const ENV_DEFAULT_AFFECTS_VERSION: &str = "TRIAGE_DEFAULT_JIRA_AFFECTS_VERSION";
pub const ENV_DEFAULT_ADDITIONAL_LABELS: &str = "TRIAGE_DEFAULT_JIRA_ADDITIONAL_LABELS";
pub const ENV_DEFAULT_ASSIGNEE: &str = "TRIAGE_DEFAULT_JIRA_ASSIGNEE";
pub const ENV_DEFAULT_PRIORITY: &str = "TRIAGE_DEFAULT_JIRA_PRIORITY";
pub const ENV_DEFAULT_SECURITY_LEVEL: &str = "TRIAGE_DEFAULT_JIRA_SECURITY_LEVEL";

/// Source of the values substituted for `!default`.
pub trait DefaultsProvider {
    fn project(&self) -> Option<String>;
    fn epic(&self) -> Option<String>;
    fn components(&self) -> Vec<String>;
    fn affects_version(&self) -> Option<String>;
    fn additional_labels(&self) -> Vec<String>;
    fn assignee(&self) -> Option<String>;
    fn priority(&self) -> Option<String>;
    fn security_level(&self) -> Option<String>;
}

/// A fixed set of defaults, one per rule field type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefaults {
    pub project: Option<String>,
    pub epic: Option<String>,
    pub components: Vec<String>,
    pub affects_version: Option<String>,
    pub additional_labels: Vec<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub security_level: Option<String>,
}

impl RuleDefaults {
    /// Snapshot the `TRIAGE_DEFAULT_JIRA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build defaults from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. List values accept either a JSON
    /// array of strings or a comma-separated string.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let scalar = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let list = |key: &str| scalar(key).map(|v| parse_list(&v)).unwrap_or_default();

        Self {
            project: scalar(ENV_DEFAULT_PROJECT),
            epic: scalar(ENV_DEFAULT_EPIC),
            components: list(ENV_DEFAULT_COMPONENT),
            affects_version: scalar(ENV_DEFAULT_AFFECTS_VERSION),
            additional_labels: list(ENV_DEFAULT_ADDITIONAL_LABELS),
            assignee: scalar(ENV_DEFAULT_ASSIGNEE),
            priority: scalar(ENV_DEFAULT_PRIORITY),
            security_level: scalar(ENV_DEFAULT_SECURITY_LEVEL),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    if raw.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
            return items;
        }
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl DefaultsProvider for RuleDefaults {
    fn project(&self) -> Option<String> {
        self.project.clone()
    }

    fn epic(&self) -> Option<String> {
        self.epic.clone()
    }

    fn components(&self) -> Vec<String> {
        self.components.clone()
    }

    fn affects_version(&self) -> Option<String> {
        self.affects_version.clone()
    }

    fn additional_labels(&self) -> Vec<String> {
        self.additional_labels.clone()
    }

    fn assignee(&self) -> Option<String> {
        self.assignee.clone()
    }

    fn priority(&self) -> Option<String> {
        self.priority.clone()
    }

    fn security_level(&self) -> Option<String> {
        self.security_level.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_scalars() {
        let defaults = RuleDefaults::from_lookup(lookup_from(&[
            (ENV_DEFAULT_PROJECT, "OCPBUGS"),
            (ENV_DEFAULT_PRIORITY, "major"),
        ]));
        assert_eq!(defaults.project.as_deref(), Some("OCPBUGS"));
        assert_eq!(defaults.priority.as_deref(), Some("major"));
        assert!(defaults.epic.is_none());
    }

    #[test]
    fn test_empty_value_is_unset() {
        let defaults = RuleDefaults::from_lookup(lookup_from(&[(ENV_DEFAULT_EPIC, "  ")]));
        assert!(defaults.epic.is_none());
    }

    #[test]
    fn test_list_accepts_json_array() {
        let defaults = RuleDefaults::from_lookup(lookup_from(&[(
            ENV_DEFAULT_COMPONENT,
            r#"["Installer", "Networking"]"#,
        )]));
        assert_eq!(defaults.components, vec!["Installer", "Networking"]);
    }

    #[test]
    fn test_list_accepts_comma_separated() {
        let defaults = RuleDefaults::from_lookup(lookup_from(&[(
            ENV_DEFAULT_ADDITIONAL_LABELS,
            "nightly, 4.16,,ci",
        )]));
        assert_eq!(defaults.additional_labels, vec!["nightly", "4.16", "ci"]);
    }
}
