//! CI failure triage engine.
//!
//! Turns the failures detected in one CI job run into issue tracker actions:
//! rules classify each failure, priority groups collapse related matches,
//! the filer creates new issues or comments on open duplicates, and on a
//! passing run the reconciler annotates or closes what was filed before.
//!
//! The tracker itself sits behind [`IssueTracker`]; [`fakes::MemoryTracker`]
//! implements it in memory for tests.

pub mod classifier;
pub mod config;
pub mod defaults;
mod error;
pub mod failure;
pub mod failure_rule;
pub mod fakes;
pub mod filer;
pub mod fingerprint;
pub mod job;
pub mod reconciler;
pub mod report;
pub mod rule;
pub mod telemetry;
pub mod tracker;

pub use classifier::{
    classify_failures, failure_matches_rule, filter_priority_rule_failure_pairs, RuleFailurePair,
};
pub use config::{load_additional_labels, parse_additional_labels, Configuration, TransitionMap};
pub use defaults::{DefaultsProvider, RuleDefaults};
pub use error::{ConfigError, ConfigResult, TrackerError, TrackerResult};
pub use failure::{Failure, FailureKind, FailureManifest, SecretDetection};
pub use failure_rule::{FailureKindFilter, FailureRule, StepPattern};
pub use filer::{FiledIssue, FilingReport, IssueFiler};
pub use fingerprint::Fingerprint;
pub use job::{JobContext, ReportOptions};
pub use reconciler::{ReconcileReport, Reconciler};
pub use report::{run_triage, TriageReport};
pub use rule::{Priority, Rule};
pub use telemetry::init_tracing;
pub use tracker::{IssueKey, IssueQuery, IssueTracker, IssueType, NewIssue, Resolution};
