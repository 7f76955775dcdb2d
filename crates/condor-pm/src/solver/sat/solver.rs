use std::collections::{HashMap, HashSet};

use super::decisions::Decisions;
use super::pool::{PackageId, SatPool};
use super::problem::Problem;
use super::rule::{Literal, Rule};
use super::rule_set::RuleSet;
use super::watch_graph::WatchGraph;
use crate::solver::policy::Policy;

/// Guard against runaway search
const MAX_ITERATIONS: u32 = 1_000_000;

/// CDCL search over a generated rule set.
///
/// Level 1 holds the assertions and everything they imply. Each branch
/// opens a new level; conflicts are analysed to the first unique implication
/// point, the learned rule is added and the search jumps back to the
/// highest other level in it.
pub struct SatSolver<'a> {
    policy: &'a Policy<'a>,
    rules: RuleSet,
    decisions: Decisions,
    watch_graph: WatchGraph,
    propagate_index: usize,
    /// Installed records that should stay unless a conflict forces them out
    soft_keep: Vec<PackageId>,
    /// Rules each learned rule was derived from
    learned_why: HashMap<u32, Vec<u32>>,
}

impl<'a> SatSolver<'a> {
    pub fn new(policy: &'a Policy<'a>, rules: RuleSet, package_count: usize) -> Self {
        let watch_graph = WatchGraph::from_rules(&rules);
        Self {
            policy,
            rules,
            decisions: Decisions::with_capacity(package_count),
            watch_graph,
            propagate_index: 0,
            soft_keep: Vec::new(),
            learned_why: HashMap::new(),
        }
    }

    /// Installed records to keep when nothing forces them out, best first
    pub fn with_soft_keep(mut self, installed: Vec<PackageId>) -> Self {
        self.soft_keep = installed;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run the search. Returns the installed package ids, sorted.
    pub fn solve(&mut self) -> Result<Vec<PackageId>, Problem> {
        let empty: Vec<u32> = self.rules.iter().filter(|r| r.is_empty()).map(|r| r.id()).collect();
        if !empty.is_empty() {
            return Err(Problem::from_rules(empty));
        }

        self.decisions.increment_level();
        self.process_assertions()?;
        if let Err(conflict) = self.propagate() {
            return Err(self.problem(conflict));
        }

        let mut iterations = 0u32;
        loop {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                log::warn!("SAT search exceeded {} iterations", MAX_ITERATIONS);
                return Err(Problem::default());
            }

            let Some(literal) = self.select_next() else {
                break;
            };

            self.decisions.increment_level();
            self.decisions.decide(literal, None);

            while let Err(conflict) = self.propagate() {
                if self.decisions.level() <= 1 {
                    return Err(self.problem(conflict));
                }
                self.learn(conflict);
            }
        }

        log::trace!(
            "SAT search finished after {} iterations with {} rules",
            iterations,
            self.rules.len()
        );

        Ok(self.decisions.installed())
    }

    fn process_assertions(&mut self) -> Result<(), Problem> {
        let assertions: Vec<(Literal, u32)> = self
            .rules
            .iter()
            .filter(|r| r.is_assertion())
            .map(|r| (r.literals()[0], r.id()))
            .collect();

        for (literal, rule_id) in assertions {
            if !self.decisions.decide(literal, Some(rule_id)) {
                let mut rule_ids = vec![rule_id];
                rule_ids.extend(self.decisions.reason(literal));
                return Err(Problem::from_rules(rule_ids));
            }
        }
        Ok(())
    }

    fn propagate(&mut self) -> Result<(), u32> {
        while self.propagate_index < self.decisions.len() {
            let literal = self.decisions.queue()[self.propagate_index];
            self.propagate_index += 1;
            self.watch_graph
                .propagate(literal, &self.rules, &mut self.decisions)?;
        }
        Ok(())
    }

    /// Pick the next branch literal.
    ///
    /// A rule needs a branch when none of its literals is true and all of
    /// its negative literals are false: every package it conditions on is
    /// installed and none of the packages it asks for is. The best
    /// undecided package of the first such rule is installed. Once no rule
    /// needs a branch, undecided installed records are kept.
    fn select_next(&self) -> Option<Literal> {
        for rule in self.rules.iter() {
            let literals = rule.literals();
            if literals.iter().any(|&l| self.decisions.satisfied(l)) {
                continue;
            }
            if literals.iter().any(|&l| l < 0 && self.decisions.undecided(l)) {
                continue;
            }

            let best = self.policy.best(
                literals
                    .iter()
                    .filter(|&&l| l > 0 && self.decisions.undecided(l))
                    .map(|&l| SatPool::record_index(l)),
            );
            if let Some(index) = best {
                return Some(SatPool::package_id(index));
            }
        }

        self.soft_keep
            .iter()
            .copied()
            .find(|&id| self.decisions.undecided(id))
    }

    /// First-UIP conflict analysis followed by a backjump and the unit
    /// decision of the learned rule
    fn learn(&mut self, conflict: u32) {
        let level = self.decisions.level();
        let mut seen: HashSet<u32> = HashSet::new();
        let mut why = vec![conflict];
        let mut others: Vec<Literal> = Vec::new();
        let mut pending = 0usize;
        let mut rule_id = conflict;
        let mut index = self.decisions.len();

        let uip = loop {
            if let Some(rule) = self.rules.get(rule_id) {
                for &literal in rule.literals() {
                    if !self.decisions.conflict(literal) {
                        continue;
                    }
                    if !seen.insert(literal.unsigned_abs()) {
                        continue;
                    }
                    match self.decisions.decision_level(literal) {
                        Some(l) if l == level => pending += 1,
                        Some(l) if l > 1 => others.push(literal),
                        _ => {}
                    }
                }
            }

            let mut next = None;
            while index > 0 {
                index -= 1;
                let literal = self.decisions.queue()[index];
                if seen.contains(&literal.unsigned_abs()) {
                    next = Some(literal);
                    break;
                }
            }
            let Some(literal) = next else {
                break None;
            };

            pending = pending.saturating_sub(1);
            if pending == 0 {
                break Some(literal);
            }
            match self.decisions.reason(literal) {
                Some(reason) => {
                    why.push(reason);
                    rule_id = reason;
                }
                None => break Some(literal),
            }
        };

        let Some(uip) = uip else {
            // Nothing at this level explains the conflict; undo the branch.
            self.decisions.revert_to_level(level - 1);
            self.propagate_index = self.propagate_index.min(self.decisions.len());
            return;
        };

        let backjump = others
            .iter()
            .filter_map(|&l| self.decisions.decision_level(l))
            .max()
            .unwrap_or(1);

        let mut literals = Vec::with_capacity(others.len() + 1);
        literals.push(-uip);
        literals.extend(others.iter().copied());
        let watch_other = others
            .iter()
            .copied()
            .max_by_key(|&l| self.decisions.decision_level(l));

        log::trace!("Learned {:?}, jumping back to level {}", literals, backjump);

        let learned_id = self.rules.add(Rule::learned(literals));
        self.learned_why.entry(learned_id).or_insert(why);

        self.decisions.revert_to_level(backjump);
        self.propagate_index = self.propagate_index.min(self.decisions.len());

        if let Some(other) = watch_other {
            self.watch_graph.watch(learned_id, -uip, other);
        }
        self.decisions.decide(-uip, Some(learned_id));
    }

    fn problem(&self, conflict: u32) -> Problem {
        Problem::from_conflict(conflict, &self.rules, &self.decisions, &self.learned_why)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::record;
    use crate::database::Database;
    use crate::request::Request;
    use crate::solver::sat::rule_generator::RuleGenerator;
    use crate::solver::{SolverFlags, SolverKind};
    use condor_spec::MatchSpec;

    fn run(db: &mut Database, request: &Request) -> Result<Vec<String>, Problem> {
        db.create_whatprovides();
        let flags = SolverFlags::default();
        let policy = Policy::new(db, request, &flags);
        let rules = RuleGenerator::new(db, &policy).generate(request);
        let mut solver = SatSolver::new(&policy, rules, db.len());
        let ids = solver.solve()?;
        Ok(ids
            .into_iter()
            .map(|id| db.record(SatPool::record_index(id)).unwrap().record.dist_str())
            .collect())
    }

    fn install(specs: &[&str]) -> Request {
        let mut request = Request::new();
        for spec in specs {
            request.install(MatchSpec::parse(spec).unwrap());
        }
        request
    }

    #[test]
    fn test_solver_simple() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository(
            "c",
            vec![
                record("a", "1.0", &["b >=1"]),
                record("b", "1.0", &[]),
                record("b", "2.0", &[]),
            ],
            0,
        )
        .unwrap();

        let selected = run(&mut db, &install(&["a"])).unwrap();
        assert_eq!(selected, vec!["a-1.0-h0_0", "b-2.0-h0_0"]);
    }

    #[test]
    fn test_solver_backtracks_on_conflict() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository(
            "c",
            vec![
                record("a", "1.0", &["c 1.*"]),
                record("a", "2.0", &["c 2.*"]),
                record("b", "1.0", &["c 1.*"]),
                record("b", "0.5", &["c 1.*"]),
                record("c", "1.0", &[]),
                record("c", "2.0", &[]),
            ],
            0,
        )
        .unwrap();

        let selected = run(&mut db, &install(&["a", "b"])).unwrap();
        assert_eq!(selected, vec!["a-1.0-h0_0", "b-1.0-h0_0", "c-1.0-h0_0"]);
    }

    #[test]
    fn test_solver_missing_dependency() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("c", vec![record("a", "1.0", &["zzz"])], 0).unwrap();

        let problem = run(&mut db, &install(&["a"])).unwrap_err();
        assert!(!problem.rule_ids().is_empty());
    }

    #[test]
    fn test_solver_conflicting_jobs() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("c", vec![record("a", "1.0", &[]), record("a", "2.0", &[])], 0)
            .unwrap();

        assert!(run(&mut db, &install(&["a 1.0", "a 2.0"])).is_err());
    }

    #[test]
    fn test_solver_empty_root_rule() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("c", vec![record("a", "1.0", &[])], 0).unwrap();

        let problem = run(&mut db, &install(&["a", "nope", "nada"])).unwrap_err();
        assert_eq!(problem.rule_ids().len(), 2);
    }
}
