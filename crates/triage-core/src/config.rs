//! Rule configuration loading.
//!
//! The configuration file is JSON:
//!
//! ```json
//! {
//!   "default_jira_project": "OCPBUGS",
//!   "failure_rules": [ { "step": "install", "failure_type": "pod_failure", ... } ],
//!   "success_rules": [ { "jira_project": "PASSING" } ],
//!   "transition_map": { "OCPBUGS": "Verified", "DEFAULT": "Closed" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::defaults::DefaultsProvider;
use crate::error::{ConfigError, ConfigResult};
use crate::failure_rule::FailureRule;
use crate::rule::{dedup_preserving_order, validate_labels, Rule, DEFAULT_SENTINEL};

/// Transition-map key consulted when the issue's project has no entry.
pub const DEFAULT_TRANSITION_KEY: &str = "DEFAULT";

/// Transition used when neither the project nor `DEFAULT` is mapped.
pub const FALLBACK_TRANSITION: &str = "Closed";

/// Project key to workflow transition name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionMap(pub BTreeMap<String, String>);

impl TransitionMap {
    pub fn transition_for(&self, project: &str) -> &str {
        self.0
            .get(project)
            .or_else(|| self.0.get(DEFAULT_TRANSITION_KEY))
            .map(String::as_str)
            .unwrap_or(FALLBACK_TRANSITION)
    }
}

/// Validated rule set for one run. Rules are kept in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub default_project: String,
    pub failure_rules: Vec<FailureRule>,
    pub success_rules: Vec<Rule>,
    pub transition_map: Option<TransitionMap>,
}

#[derive(Debug, Deserialize)]
struct RawConfiguration {
    #[serde(default)]
    default_jira_project: Option<String>,
    #[serde(default)]
    failure_rules: Vec<Value>,
    #[serde(default)]
    success_rules: Vec<Value>,
    #[serde(default)]
    transition_map: Option<TransitionMap>,
}

impl Configuration {
    pub fn new(default_project: impl Into<String>, failure_rules: Vec<FailureRule>) -> Self {
        Self {
            default_project: default_project.into(),
            failure_rules,
            success_rules: Vec::new(),
            transition_map: None,
        }
    }

    /// Parse and validate a configuration document. The first invalid rule
    /// aborts loading.
    pub fn from_json_str(raw: &str, defaults: &dyn DefaultsProvider) -> ConfigResult<Self> {
        let raw: RawConfiguration = serde_json::from_str(raw)?;

        let default_project = raw
            .default_jira_project
            .filter(|p| !p.is_empty() && p != DEFAULT_SENTINEL)
            .or_else(|| defaults.project())
            .ok_or(ConfigError::NoDefaultProject)?;

        let defaults = WithDefaultProject {
            inner: defaults,
            project: &default_project,
        };

        let failure_rules = raw
            .failure_rules
            .iter()
            .map(|value| FailureRule::from_json(value, &defaults))
            .collect::<ConfigResult<Vec<_>>>()?;

        let success_rules = raw
            .success_rules
            .iter()
            .map(|value| Rule::from_json(value, &defaults))
            .collect::<ConfigResult<Vec<_>>>()?;

        debug!(
            default_project = %default_project,
            failure_rules = failure_rules.len(),
            success_rules = success_rules.len(),
            "loaded configuration"
        );

        Ok(Self {
            default_project,
            failure_rules,
            success_rules,
            transition_map: raw.transition_map,
        })
    }

    pub fn from_file(path: &Path, defaults: &dyn DefaultsProvider) -> ConfigResult<Self> {
        let raw = read(path)?;
        Self::from_json_str(&raw, defaults)
    }
}

/// The configured default project also answers `!default` in rules.
struct WithDefaultProject<'a> {
    inner: &'a dyn DefaultsProvider,
    project: &'a str,
}

impl DefaultsProvider for WithDefaultProject<'_> {
    fn project(&self) -> Option<String> {
        Some(self.project.to_string())
    }

    fn epic(&self) -> Option<String> {
        self.inner.epic()
    }

    fn components(&self) -> Vec<String> {
        self.inner.components()
    }

    fn affects_version(&self) -> Option<String> {
        self.inner.affects_version()
    }

    fn additional_labels(&self) -> Vec<String> {
        self.inner.additional_labels()
    }

    fn assignee(&self) -> Option<String> {
        self.inner.assignee()
    }

    fn priority(&self) -> Option<String> {
        self.inner.priority()
    }

    fn security_level(&self) -> Option<String> {
        self.inner.security_level()
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse an additional-labels document: a JSON array of strings, or one
/// label per line (blank lines skipped).
pub fn parse_additional_labels(raw: &str) -> ConfigResult<Vec<String>> {
    let trimmed = raw.trim();
    let labels: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    };
    let labels = dedup_preserving_order(labels);
    validate_labels(&labels, "additional labels file")?;
    Ok(labels)
}

pub fn load_additional_labels(path: &Path) -> ConfigResult<Vec<String>> {
    parse_additional_labels(&read(path)?)
}
