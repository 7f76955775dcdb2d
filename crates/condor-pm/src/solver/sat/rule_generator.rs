use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Instant;

use super::pool::SatPool;
use super::rule::Rule;
use super::rule_set::RuleSet;
use crate::database::Database;
use crate::request::{JobAction, Request};
use crate::solver::policy::Policy;

/// Generates SAT rules from the request and the records it can reach.
///
/// - Root requirements: one candidate of each install or update job
/// - Package requirements: if A is installed, then B|C|D must be installed
/// - Constraints: A and a record violating its `constrains` entry conflict
/// - Same-name: only one record per name can be installed
/// - Pins and remove jobs: assertions excluding records
/// - Keep rules: installed names stay installed unless uninstalling is allowed
pub struct RuleGenerator<'a> {
    db: &'a Database,
    policy: &'a Policy<'a>,
    rules: RuleSet,
    visited: HashSet<usize>,
    /// Visited records grouped by lowercase name
    by_name: BTreeMap<String, Vec<usize>>,
}

impl<'a> RuleGenerator<'a> {
    pub fn new(db: &'a Database, policy: &'a Policy<'a>) -> Self {
        Self {
            db,
            policy,
            rules: RuleSet::new(),
            visited: HashSet::new(),
            by_name: BTreeMap::new(),
        }
    }

    pub fn generate(mut self, request: &Request) -> RuleSet {
        let start = Instant::now();
        let mut queue = VecDeque::new();

        for (job_index, job) in request.jobs().iter().enumerate() {
            match job.action {
                JobAction::Install | JobAction::Update => {
                    let candidates = self.policy.candidates(&job.spec);
                    let ids = candidates.iter().map(|&i| SatPool::package_id(i)).collect();
                    self.rules
                        .add(Rule::root_require(ids, job_index).with_spec(job.spec.to_string()));
                    queue.extend(candidates);
                }
                JobAction::Remove => {
                    for index in self.db.candidate_indices(&job.spec) {
                        self.rules.add(
                            Rule::removed(SatPool::package_id(index), job_index)
                                .with_spec(job.spec.to_string()),
                        );
                        queue.push_back(index);
                    }
                }
            }
        }

        queue.extend(
            self.db
                .records()
                .iter()
                .enumerate()
                .filter(|(_, r)| r.installed)
                .map(|(index, _)| index),
        );

        while let Some(index) = queue.pop_front() {
            if !self.visited.insert(index) {
                continue;
            }
            self.add_package_rules(index, &mut queue);
        }

        self.add_same_name_rules();
        self.add_pin_rules(request);
        if !self.policy.flags().allow_uninstall {
            self.add_keep_rules(request);
        }

        log::debug!(
            "Generated {} rules for {} packages in {:?}",
            self.rules.len(),
            self.visited.len(),
            start.elapsed()
        );

        self.rules
    }

    fn add_package_rules(&mut self, index: usize, queue: &mut VecDeque<usize>) {
        let Some(stored) = self.db.record(index) else {
            return;
        };
        let id = SatPool::package_id(index);
        self.by_name
            .entry(stored.record.name.to_lowercase())
            .or_default()
            .push(index);

        for dep in &stored.depends {
            let candidates = self.policy.candidates(dep);
            let mut targets: Vec<_> = candidates.iter().map(|&i| SatPool::package_id(i)).collect();
            targets.dedup();
            self.rules
                .add(Rule::requires(id, targets).with_spec(dep.to_string()));
            queue.extend(candidates);
        }

        for constraint in &stored.constrains {
            let Some(name) = constraint.name() else {
                continue;
            };
            for other in self.db.records_named(name) {
                if other == index {
                    continue;
                }
                let violates = self
                    .db
                    .record(other)
                    .is_some_and(|r| !constraint.matches(&r.record));
                if violates {
                    self.rules.add(
                        Rule::constrains(id, SatPool::package_id(other))
                            .with_spec(constraint.to_string()),
                    );
                }
            }
        }
    }

    fn add_same_name_rules(&mut self) {
        for (name, indices) in &self.by_name {
            if indices.len() < 2 {
                continue;
            }
            let ids = indices.iter().map(|&i| SatPool::package_id(i)).collect();
            self.rules.add(Rule::multi_conflict(ids).with_spec(name.clone()));
        }
    }

    fn add_pin_rules(&mut self, request: &Request) {
        for pin in request.pins() {
            let Some(name) = pin.name() else {
                continue;
            };
            let Some(indices) = self.by_name.get(&name.to_lowercase()) else {
                continue;
            };
            for &index in indices {
                let excluded = self.db.record(index).is_some_and(|r| !pin.matches(&r.record));
                if excluded {
                    self.rules
                        .add(Rule::pinned(SatPool::package_id(index)).with_spec(pin.to_string()));
                }
            }
        }
    }

    fn add_keep_rules(&mut self, request: &Request) {
        let removed: HashSet<String> = request
            .jobs()
            .iter()
            .filter(|job| job.action == JobAction::Remove)
            .filter_map(|job| job.name())
            .map(str::to_lowercase)
            .collect();

        let installed_names: BTreeMap<String, ()> = self
            .db
            .installed_records()
            .map(|r| (r.record.name.to_lowercase(), ()))
            .collect();

        for name in installed_names.keys() {
            if removed.contains(name) {
                continue;
            }
            let Some(indices) = self.by_name.get(name) else {
                continue;
            };
            let ids = indices
                .iter()
                .filter(|&&i| self.policy.is_allowed(i))
                .map(|&i| SatPool::package_id(i))
                .collect();
            self.rules.add(Rule::keep_installed(ids).with_spec(name.clone()));
        }
    }
}
