//! Rules that match failures.
//!
//! A [`FailureRule`] is a [`Rule`] plus a match predicate: a glob over the
//! step name and a failure-kind filter. It also carries the classification
//! text written into issues, an optional priority group, and an ignore flag.

use std::ops::Deref;

use glob::Pattern;
use serde_json::Value;

use crate::defaults::DefaultsProvider;
use crate::error::{ConfigError, ConfigResult};
use crate::failure::{Failure, FailureKind};
use crate::rule::{RawRule, Rule};

/// Marker used by the synthetic default rule; matches nothing.
pub const NO_MATCH_SENTINEL: &str = "!none";

pub const KEY_STEP: &str = "step";
pub const KEY_FAILURE_TYPE: &str = "failure_type";
pub const KEY_CLASSIFICATION: &str = "classification";
pub const KEY_GROUP: &str = "group";
pub const KEY_IGNORE: &str = "ignore";

/// Which failure kinds a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKindFilter {
    Kind(FailureKind),
    All,
    /// Only used by the synthetic default rule.
    Never,
}

impl FailureKindFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all" => Some(FailureKindFilter::All),
            other => other.parse().ok().map(FailureKindFilter::Kind),
        }
    }

    pub fn accepts(&self, kind: FailureKind) -> bool {
        match self {
            FailureKindFilter::Kind(k) => *k == kind,
            FailureKindFilter::All => true,
            FailureKindFilter::Never => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKindFilter::Kind(k) => k.as_str(),
            FailureKindFilter::All => "all",
            FailureKindFilter::Never => NO_MATCH_SENTINEL,
        }
    }
}

/// A compiled step-name glob (`*` any run, `?` one character, case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPattern {
    raw: String,
    compiled: Option<Pattern>,
}

impl StepPattern {
    pub fn new(raw: &str) -> Result<Self, glob::PatternError> {
        Ok(Self {
            raw: raw.to_string(),
            compiled: Some(Pattern::new(raw)?),
        })
    }

    /// A pattern that never matches any step.
    pub fn never() -> Self {
        Self {
            raw: NO_MATCH_SENTINEL.to_string(),
            compiled: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, step: &str) -> bool {
        self.compiled.as_ref().is_some_and(|p| p.matches(step))
    }

    /// Literal equality with the step name, not glob matching.
    pub fn is_exact(&self, step: &str) -> bool {
        self.compiled.is_some() && self.raw == step
    }
}

/// A rule that classifies matching failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRule {
    pub rule: Rule,
    pub step: StepPattern,
    pub failure_kind: FailureKindFilter,
    pub classification: String,
    pub group_name: Option<String>,
    pub group_priority: Option<i64>,
    pub ignore: bool,
}

impl Deref for FailureRule {
    type Target = Rule;

    fn deref(&self) -> &Rule {
        &self.rule
    }
}

impl FailureRule {
    /// Build a failure rule from a raw JSON entry.
    ///
    /// `step`, `failure_type`, `classification` and `jira_project` are
    /// required; missing or malformed values are fatal.
    pub fn from_json(value: &Value, defaults: &dyn DefaultsProvider) -> ConfigResult<Self> {
        let raw = RawRule::new(value)?;

        let step_raw = raw.required_string(KEY_STEP)?;
        let step = StepPattern::new(&step_raw).map_err(|e| ConfigError::InvalidStepPattern {
            value: step_raw.clone(),
            reason: e.msg.to_string(),
            rule: raw.rendered().to_string(),
        })?;

        let kind_raw = raw.required_string(KEY_FAILURE_TYPE)?;
        let failure_kind =
            FailureKindFilter::parse(&kind_raw).ok_or_else(|| ConfigError::InvalidFailureKind {
                value: kind_raw.clone(),
                rule: raw.rendered().to_string(),
            })?;

        let classification = raw.required_string(KEY_CLASSIFICATION)?;
        let ignore = raw.flag(KEY_IGNORE)?;

        let (group_name, group_priority) = match raw.object(KEY_GROUP)? {
            None => (None, None),
            Some(group) => {
                let name = match group.get("name") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()).filter(|s| !s.is_empty()),
                    Some(_) => {
                        return Err(raw.wrong_type(KEY_GROUP, "an object with a string name"))
                    }
                };
                let priority = match group.get("priority") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(v.as_i64().ok_or_else(|| {
                        raw.wrong_type(KEY_GROUP, "an object with an integer priority")
                    })?),
                };
                (name, priority)
            }
        };

        let rule = Rule::from_raw(&raw, defaults)?;

        Ok(Self {
            rule,
            step,
            failure_kind,
            classification,
            group_name,
            group_priority,
            ignore,
        })
    }

    /// The rule applied to failures nothing else matched.
    pub fn default_rule(default_project: &str) -> Self {
        Self {
            rule: Rule::for_project(default_project),
            step: StepPattern::never(),
            failure_kind: FailureKindFilter::Never,
            classification: NO_MATCH_SENTINEL.to_string(),
            group_name: None,
            group_priority: None,
            ignore: false,
        }
    }

    pub fn is_default_rule(&self) -> bool {
        self.failure_kind == FailureKindFilter::Never
    }

    pub fn matches(&self, failure: &Failure) -> bool {
        self.step.matches(&failure.step) && self.failure_kind.accepts(failure.kind)
    }

    /// Group name and priority, when both are set.
    pub fn priority_group(&self) -> Option<(&str, i64)> {
        match (&self.group_name, self.group_priority) {
            (Some(name), Some(priority)) if !name.is_empty() => Some((name.as_str(), priority)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::RuleDefaults;
    use serde_json::json;

    fn build(value: serde_json::Value) -> ConfigResult<FailureRule> {
        FailureRule::from_json(&value, &RuleDefaults::default())
    }

    #[test]
    fn test_full_rule() {
        let rule = build(json!({
            "step": "gather-*",
            "failure_type": "all",
            "classification": "Gather failure",
            "jira_project": "LPTOCPCI",
            "group": { "name": "cluster", "priority": 2 },
            "ignore": "false",
        }))
        .expect("valid rule");

        assert_eq!(rule.step.as_str(), "gather-*");
        assert_eq!(rule.failure_kind, FailureKindFilter::All);
        assert_eq!(rule.project, "LPTOCPCI");
        assert_eq!(rule.priority_group(), Some(("cluster", 2)));
        assert!(!rule.ignore);
    }

    #[test]
    fn test_missing_required_fields() {
        for key in [KEY_STEP, KEY_FAILURE_TYPE, KEY_CLASSIFICATION, "jira_project"] {
            let mut value = json!({
                "step": "install",
                "failure_type": "pod_failure",
                "classification": "infra",
                "jira_project": "OCPBUGS",
            });
            value.as_object_mut().expect("object").remove(key);
            let err = build(value).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingField { key: k, .. } if k == key),
                "expected missing {key}, got {err}"
            );
        }
    }

    #[test]
    fn test_invalid_failure_type() {
        let err = build(json!({
            "step": "install",
            "failure_type": "build_failure",
            "classification": "infra",
            "jira_project": "OCPBUGS",
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFailureKind { .. }));
    }

    #[test]
    fn test_invalid_glob() {
        let err = build(json!({
            "step": "install-[",
            "failure_type": "all",
            "classification": "infra",
            "jira_project": "OCPBUGS",
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStepPattern { .. }));
    }

    #[test]
    fn test_ignore_flag_accepts_strings_and_bools() {
        for raw in [json!(true), json!("True"), json!("true")] {
            let rule = build(json!({
                "step": "install",
                "failure_type": "pod_failure",
                "classification": "noise",
                "jira_project": "OCPBUGS",
                "ignore": raw,
            }))
            .expect("valid rule");
            assert!(rule.ignore);
        }
    }

    #[test]
    fn test_glob_semantics() {
        let pattern = StepPattern::new("gather-*").expect("valid glob");
        assert!(pattern.matches("gather-must-gather"));
        assert!(!pattern.matches("other-step"));
        assert!(!pattern.matches("Gather-must-gather"));

        let single = StepPattern::new("e2e-?").expect("valid glob");
        assert!(single.matches("e2e-a"));
        assert!(!single.matches("e2e-ab"));
    }

    #[test]
    fn test_exact_is_literal_equality() {
        let pattern = StepPattern::new("install*").expect("valid glob");
        assert!(pattern.matches("install"));
        assert!(!pattern.is_exact("install"));
        assert!(StepPattern::new("install").expect("valid glob").is_exact("install"));
    }

    #[test]
    fn test_default_rule_matches_nothing() {
        let rule = FailureRule::default_rule("OCPBUGS");
        assert!(rule.is_default_rule());
        assert_eq!(rule.project, "OCPBUGS");
        assert_eq!(rule.step.as_str(), NO_MATCH_SENTINEL);
        assert!(!rule.matches(&Failure::pod(NO_MATCH_SENTINEL)));
        assert!(!rule.matches(&Failure::pod("install")));
    }

    #[test]
    fn test_priority_group_needs_name_and_priority() {
        let mut rule = FailureRule::default_rule("P");
        rule.group_name = Some("cluster".to_string());
        assert_eq!(rule.priority_group(), None);
        rule.group_priority = Some(1);
        assert_eq!(rule.priority_group(), Some(("cluster", 1)));
        rule.group_name = Some(String::new());
        assert_eq!(rule.priority_group(), None);
    }
}
