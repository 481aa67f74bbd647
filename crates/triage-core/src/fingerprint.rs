//! Duplicate-detection fingerprints.
//!
//! A fingerprint is (project, job, step, kind[, test]). Its labels are both
//! attached to new issues and used verbatim as search terms, so the same
//! inputs always find the issue filed by an earlier run.

use serde::{Deserialize, Serialize};

use crate::classifier::RuleFailurePair;
use crate::failure::FailureKind;
use crate::tracker::IssueQuery;

/// How many resolved issues the description links to.
pub const RESOLVED_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub project: String,
    pub job_name: String,
    pub step: String,
    pub kind: FailureKind,
    /// Only set under verbose test-failure reporting.
    pub test_name: Option<String>,
}

impl Fingerprint {
    pub fn for_pair(pair: &RuleFailurePair, job_name: &str, verbose: bool) -> Self {
        Self {
            project: pair.rule.project.clone(),
            job_name: job_name.to_string(),
            step: pair.failure.step.clone(),
            kind: pair.failure.kind,
            test_name: if verbose {
                pair.failure.test_name.clone()
            } else {
                None
            },
        }
    }

    /// Labels in fixed order: job, kind, step, then test when present.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = vec![
            self.job_name.clone(),
            self.kind.as_str().to_string(),
            self.step.clone(),
        ];
        if let Some(test) = &self.test_name {
            labels.push(test.clone());
        }
        labels
    }

    /// Open bugs carrying every fingerprint label.
    pub fn open_duplicates(&self) -> IssueQuery {
        IssueQuery::bugs(&self.project)
            .unresolved()
            .with_labels(self.labels())
    }

    /// Most recent resolved bugs with the same fingerprint.
    pub fn resolved_history(&self) -> IssueQuery {
        IssueQuery::bugs(&self.project)
            .resolved()
            .with_labels(self.labels())
            .limit(RESOLVED_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::Failure;
    use crate::failure_rule::FailureRule;
    use crate::tracker::Resolution;

    fn pair(failure: Failure) -> RuleFailurePair {
        RuleFailurePair {
            rule: FailureRule::default_rule("OCPBUGS"),
            failure,
        }
    }

    #[test]
    fn test_labels_without_verbose_drop_test_name() {
        let fp = Fingerprint::for_pair(&pair(Failure::test("e2e", "dns")), "periodic", false);
        assert_eq!(fp.labels(), vec!["periodic", "test_failure", "e2e"]);
    }

    #[test]
    fn test_labels_with_verbose_include_test_name() {
        let fp = Fingerprint::for_pair(&pair(Failure::test("e2e", "dns")), "periodic", true);
        assert_eq!(fp.labels(), vec!["periodic", "test_failure", "e2e", "dns"]);
    }

    #[test]
    fn test_queries() {
        let fp = Fingerprint::for_pair(&pair(Failure::pod("install")), "periodic", false);

        let open = fp.open_duplicates();
        assert_eq!(open.project, "OCPBUGS");
        assert_eq!(open.resolution, Resolution::Unresolved);
        assert_eq!(open.labels, fp.labels());
        assert_eq!(open.limit, None);

        let history = fp.resolved_history();
        assert_eq!(history.resolution, Resolution::Resolved);
        assert_eq!(history.limit, Some(RESOLVED_HISTORY_LIMIT));
    }

    #[test]
    fn test_fingerprint_is_reproducible() {
        let a = Fingerprint::for_pair(&pair(Failure::pod("install")), "periodic", false);
        let b = Fingerprint::for_pair(&pair(Failure::pod("install")), "periodic", false);
        assert_eq!(a, b);
        assert_eq!(a.open_duplicates(), b.open_duplicates());
    }
}
