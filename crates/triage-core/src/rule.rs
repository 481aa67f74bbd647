//! Operator-authored filing rules.
//!
//! A [`Rule`] says where an issue goes and what metadata it carries. Raw rule
//! entries are JSON objects; any value equal to `!default` (or a list holding
//! that element) is resolved against a [`DefaultsProvider`] at construction,
//! so consumers only ever see concrete values.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults::DefaultsProvider;
use crate::error::{ConfigError, ConfigResult};

/// Literal that defers a rule value to the environment-level default.
pub const DEFAULT_SENTINEL: &str = "!default";

pub const KEY_PROJECT: &str = "jira_project";
pub const KEY_EPIC: &str = "jira_epic";
pub const KEY_COMPONENT: &str = "jira_component";
pub const KEY_AFFECTS_VERSION: &str = "jira_affects_version";
pub const KEY_ADDITIONAL_LABELS: &str = "jira_additional_labels";
pub const KEY_ASSIGNEE: &str = "jira_assignee";
pub const KEY_PRIORITY: &str = "jira_priority";
pub const KEY_SECURITY_LEVEL: &str = "jira_security_level";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A scalar rule value as written by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    Value(T),
    UseDefault,
}

impl Setting<String> {
    fn parse(raw: &str) -> Self {
        if raw == DEFAULT_SENTINEL {
            Setting::UseDefault
        } else {
            Setting::Value(raw.to_string())
        }
    }

    fn resolve(self, default: impl FnOnce() -> Option<String>) -> Option<String> {
        match self {
            Setting::Value(v) => Some(v),
            Setting::UseDefault => default(),
        }
    }
}

/// A list rule value: the operator's entries plus whether `!default` was present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSetting {
    pub values: Vec<String>,
    pub use_default: bool,
}

impl ListSetting {
    fn parse(items: Vec<String>) -> Self {
        let use_default = items.iter().any(|i| i == DEFAULT_SENTINEL);
        let values = items
            .into_iter()
            .filter(|i| i != DEFAULT_SENTINEL)
            .collect();
        Self {
            values,
            use_default,
        }
    }

    /// Append the default list after the operator's own entries.
    fn resolve(self, default: impl FnOnce() -> Vec<String>) -> Vec<String> {
        let mut resolved = self.values;
        if self.use_default {
            resolved.extend(default());
        }
        dedup_preserving_order(resolved)
    }
}

pub(crate) fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert(i.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Tracker priority accepted on rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Blocker,
    Critical,
    Major,
    Normal,
    Minor,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Blocker => "Blocker",
            Priority::Critical => "Critical",
            Priority::Major => "Major",
            Priority::Normal => "Normal",
            Priority::Minor => "Minor",
        }
    }

    /// Lowercase, capitalize the first letter, then match the fixed set.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        let mut chars = lower.chars();
        let normalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => return None,
        };
        match normalized.as_str() {
            "Blocker" => Some(Priority::Blocker),
            "Critical" => Some(Priority::Critical),
            "Major" => Some(Priority::Major),
            "Normal" => Some(Priority::Normal),
            "Minor" => Some(Priority::Minor),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

/// Without a compiled pattern every address is rejected.
pub fn is_valid_email(value: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(value))
}

/// Reject labels with embedded whitespace; the tracker splits on it.
pub(crate) fn validate_labels(labels: &[String], rule: &str) -> ConfigResult<()> {
    match labels.iter().find(|l| l.chars().any(char::is_whitespace)) {
        Some(bad) => Err(ConfigError::WhitespaceInLabel {
            value: bad.clone(),
            rule: rule.to_string(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Raw rule access
// ---------------------------------------------------------------------------

/// Typed accessors over a raw JSON rule entry.
pub(crate) struct RawRule<'a> {
    fields: &'a Map<String, Value>,
    rendered: String,
}

impl<'a> RawRule<'a> {
    pub(crate) fn new(value: &'a Value) -> ConfigResult<Self> {
        let rendered = value.to_string();
        match value.as_object() {
            Some(fields) => Ok(Self { fields, rendered }),
            None => Err(ConfigError::WrongType {
                key: "rule",
                expected: "a JSON object",
                rule: rendered,
            }),
        }
    }

    pub(crate) fn rendered(&self) -> &str {
        &self.rendered
    }

    pub(crate) fn missing(&self, key: &'static str) -> ConfigError {
        ConfigError::MissingField {
            key,
            rule: self.rendered.clone(),
        }
    }

    pub(crate) fn wrong_type(&self, key: &'static str, expected: &'static str) -> ConfigError {
        ConfigError::WrongType {
            key,
            expected,
            rule: self.rendered.clone(),
        }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Absent, null, and empty strings are all `None`.
    pub(crate) fn string(&self, key: &'static str) -> ConfigResult<Option<String>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.wrong_type(key, "a string")),
        }
    }

    pub(crate) fn required_string(&self, key: &'static str) -> ConfigResult<String> {
        self.string(key)?.ok_or_else(|| self.missing(key))
    }

    pub(crate) fn setting(&self, key: &'static str) -> ConfigResult<Option<Setting<String>>> {
        Ok(self.string(key)?.map(|s| Setting::parse(&s)))
    }

    /// Lists may be written as an array of strings or a single string.
    pub(crate) fn list(&self, key: &'static str) -> ConfigResult<Option<ListSetting>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(ListSetting::parse(vec![s.clone()]))),
            Some(Value::Array(items)) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => values.push(s.to_string()),
                        None => return Err(self.wrong_type(key, "a list of strings")),
                    }
                }
                Ok(Some(ListSetting::parse(values)))
            }
            Some(_) => Err(self.wrong_type(key, "a list of strings")),
        }
    }

    /// Booleans may also be the strings `"true"` / `"false"` in any case.
    pub(crate) fn flag(&self, key: &'static str) -> ConfigResult<bool> {
        match self.present(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
            Some(_) => Err(self.wrong_type(key, "a boolean")),
        }
    }

    pub(crate) fn object(&self, key: &'static str) -> ConfigResult<Option<&'a Map<String, Value>>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self.wrong_type(key, "an object")),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A validated filing destination plus issue metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub project: String,
    pub epic: Option<String>,
    pub components: Vec<String>,
    pub affects_version: Option<String>,
    pub additional_labels: Vec<String>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub security_level: Option<String>,
}

impl Rule {
    /// A rule that only names a project.
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            epic: None,
            components: Vec::new(),
            affects_version: None,
            additional_labels: Vec::new(),
            assignee: None,
            priority: None,
            security_level: None,
        }
    }

    /// Build a rule from a raw JSON entry, resolving `!default` values.
    pub fn from_json(value: &Value, defaults: &dyn DefaultsProvider) -> ConfigResult<Self> {
        let raw = RawRule::new(value)?;
        Self::from_raw(&raw, defaults)
    }

    pub(crate) fn from_raw(
        raw: &RawRule<'_>,
        defaults: &dyn DefaultsProvider,
    ) -> ConfigResult<Self> {
        let project = match raw.setting(KEY_PROJECT)? {
            None => return Err(raw.missing(KEY_PROJECT)),
            Some(setting) => setting
                .resolve(|| defaults.project())
                .ok_or_else(|| ConfigError::MissingDefault {
                    key: KEY_PROJECT,
                    rule: raw.rendered().to_string(),
                })?,
        };

        let epic = raw.setting(KEY_EPIC)?.and_then(|s| s.resolve(|| defaults.epic()));
        let affects_version = raw
            .setting(KEY_AFFECTS_VERSION)?
            .and_then(|s| s.resolve(|| defaults.affects_version()));
        let security_level = raw
            .setting(KEY_SECURITY_LEVEL)?
            .and_then(|s| s.resolve(|| defaults.security_level()));

        let components = raw
            .list(KEY_COMPONENT)?
            .map(|l| l.resolve(|| defaults.components()))
            .unwrap_or_default();

        let additional_labels = raw
            .list(KEY_ADDITIONAL_LABELS)?
            .map(|l| l.resolve(|| defaults.additional_labels()))
            .unwrap_or_default();
        validate_labels(&additional_labels, raw.rendered())?;

        let assignee = raw
            .setting(KEY_ASSIGNEE)?
            .and_then(|s| s.resolve(|| defaults.assignee()));
        if let Some(email) = &assignee {
            if !is_valid_email(email) {
                return Err(ConfigError::InvalidEmail {
                    value: email.clone(),
                    rule: raw.rendered().to_string(),
                });
            }
        }

        let priority = match raw
            .setting(KEY_PRIORITY)?
            .and_then(|s| s.resolve(|| defaults.priority()))
        {
            None => None,
            Some(value) => Some(Priority::normalize(&value).ok_or_else(|| {
                ConfigError::InvalidPriority {
                    value,
                    rule: raw.rendered().to_string(),
                }
            })?),
        };

        Ok(Self {
            project,
            epic,
            components,
            affects_version,
            additional_labels,
            assignee,
            priority,
            security_level,
        })
    }
}
