//! Failure classification.
//!
//! [`failure_matches_rule`] decides which rules apply to one failure;
//! [`classify_failures`] produces the rule/failure pairs for a whole job and
//! [`filter_priority_rule_failure_pairs`] collapses priority groups so one
//! root cause files one ticket.

use std::collections::HashMap;

use tracing::debug;

use crate::failure::Failure;
use crate::failure_rule::FailureRule;

/// A rule matched to a failure, consumed once by the filer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailurePair {
    pub rule: FailureRule,
    pub failure: Failure,
}

/// Return the rules that apply to `failure`, in filing order.
///
/// - No rule matches at all: the synthetic default rule for `default_project`.
/// - Only ignore rules match: nothing, and the failure is marked ignored.
/// - Otherwise: the matching non-ignore rules, rules whose step pattern is
///   literally the step name first. Ignore rules never cancel active ones.
pub fn failure_matches_rule(
    failure: &mut Failure,
    rules: &[FailureRule],
    default_project: &str,
) -> Vec<FailureRule> {
    let (ignored, mut active): (Vec<&FailureRule>, Vec<&FailureRule>) = rules
        .iter()
        .filter(|rule| rule.matches(failure))
        .partition(|rule| rule.ignore);

    if ignored.is_empty() && active.is_empty() {
        debug!(step = %failure.step, kind = %failure.kind, "no rule matched, using default rule");
        return vec![FailureRule::default_rule(default_project)];
    }

    if active.is_empty() {
        debug!(step = %failure.step, kind = %failure.kind, "failure ignored by rule");
        failure.mark_ignored();
        return Vec::new();
    }

    // Stable: equal keys keep configuration order.
    active.sort_by_key(|rule| !rule.step.is_exact(&failure.step));
    active.into_iter().cloned().collect()
}

/// Match every failure and return the cross product of failures and rules.
pub fn classify_failures(
    failures: &mut [Failure],
    rules: &[FailureRule],
    default_project: &str,
) -> Vec<RuleFailurePair> {
    let mut pairs = Vec::new();
    for failure in failures.iter_mut() {
        let matched = failure_matches_rule(failure, rules, default_project);
        pairs.extend(matched.into_iter().map(|rule| RuleFailurePair {
            rule,
            failure: failure.clone(),
        }));
    }
    pairs
}

/// Keep only the lowest-priority-number pairs of each named group.
///
/// Pairs whose rule lacks a group name or priority pass through untouched.
/// Ties within a group are all kept. Input order is preserved.
pub fn filter_priority_rule_failure_pairs(pairs: Vec<RuleFailurePair>) -> Vec<RuleFailurePair> {
    let mut winners: HashMap<String, i64> = HashMap::new();
    for pair in &pairs {
        if let Some((name, priority)) = pair.rule.priority_group() {
            winners
                .entry(name.to_string())
                .and_modify(|best| *best = (*best).min(priority))
                .or_insert(priority);
        }
    }

    pairs
        .into_iter()
        .filter(|pair| match pair.rule.priority_group() {
            None => true,
            Some((name, priority)) => winners.get(name) == Some(&priority),
        })
        .collect()
}
