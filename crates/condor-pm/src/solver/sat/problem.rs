use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::decisions::Decisions;
use super::pool::{PackageId, SatPool};
use super::rule::{Rule, RuleType};
use super::rule_set::RuleSet;
use crate::database::Database;
use crate::request::Request;
use crate::solver::SolveFailure;

/// The rules behind a failed solve
#[derive(Debug, Clone, Default)]
pub struct Problem {
    rule_ids: Vec<u32>,
}

impl Problem {
    /// A problem made of the given rules only
    pub fn from_rules(rule_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rule_ids: rule_ids.into_iter().collect(),
        }
    }

    /// Collect the rules that led to `conflict`.
    ///
    /// Starts at the conflicting rule and follows the reason of every false
    /// literal. Learned rules are replaced by the rules they were derived from.
    pub fn from_conflict(
        conflict: u32,
        rules: &RuleSet,
        decisions: &Decisions,
        learned_why: &HashMap<u32, Vec<u32>>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([conflict]);
        let mut rule_ids = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(rule) = rules.get(id) else {
                continue;
            };

            if rule.rule_type() == RuleType::Learned {
                if let Some(why) = learned_why.get(&id) {
                    queue.extend(why.iter().copied());
                }
            } else {
                rule_ids.push(id);
            }

            for &literal in rule.literals() {
                if decisions.conflict(literal) {
                    queue.extend(decisions.reason(literal));
                }
            }
        }

        rule_ids.sort_unstable();
        Self { rule_ids }
    }

    #[cfg(test)]
    pub fn rule_ids(&self) -> &[u32] {
        &self.rule_ids
    }

    /// Turn the problem into a failure: the rule descriptions and the jobs
    /// they came from, falling back to every install job
    pub fn into_failure(self, rules: &RuleSet, db: &Database, request: &Request) -> SolveFailure {
        let mut lines = Vec::new();
        let mut seen_lines = HashSet::new();
        let mut jobs = BTreeSet::new();

        for &id in &self.rule_ids {
            let Some(rule) = rules.get(id) else {
                continue;
            };
            if let Some(job) = rule.job() {
                jobs.insert(job);
            }
            if let Some(line) = describe_rule(rule, db) {
                if seen_lines.insert(line.clone()) {
                    lines.push(line);
                }
            }
        }

        let failing_jobs = if jobs.is_empty() {
            request.install_job_indices()
        } else {
            jobs.into_iter().collect()
        };

        SolveFailure {
            reason: lines.join("\n"),
            failing_jobs,
        }
    }
}

fn package_string(db: &Database, id: PackageId) -> String {
    db.record(SatPool::record_index(id))
        .map(|r| r.record.to_string())
        .unwrap_or_else(|| format!("package#{}", id))
}

/// One line explaining a rule
pub fn describe_rule(rule: &Rule, db: &Database) -> Option<String> {
    let spec = rule.spec().unwrap_or_default();
    let literals = rule.literals();

    let line = match rule.rule_type() {
        RuleType::RootRequire if literals.is_empty() => {
            format!("nothing provides {} needed by the request", spec)
        }
        RuleType::RootRequire => format!("{} is requested", spec),
        RuleType::PackageRequires => {
            let source = package_string(db, rule.source()?);
            if literals.len() == 1 {
                format!("nothing provides {} needed by {}", spec, source)
            } else {
                format!("{} requires {}", source, spec)
            }
        }
        RuleType::PackageConstrains => {
            let other = literals.get(1)?;
            format!(
                "{} conflicts with {} ({})",
                package_string(db, rule.source()?),
                package_string(db, *other),
                spec
            )
        }
        RuleType::MultiConflict => format!("only one {} can be installed", spec),
        RuleType::Pinned => {
            format!("{} is excluded by pin {}", package_string(db, rule.source()?), spec)
        }
        RuleType::Removed => {
            format!("{} is requested to be removed", package_string(db, rule.source()?))
        }
        RuleType::KeepInstalled => format!("{} is already installed and must stay", spec),
        RuleType::Learned => return None,
    };

    Some(line)
}
