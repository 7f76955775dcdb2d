//! Complete-search backend.
//!
//! Every record reachable from the request is turned into clauses up
//! front; a CDCL search with two-watched-literal propagation then picks
//! the install set. When no assignment exists, the rules that took part
//! in the final conflict are reported.

mod decisions;
mod pool;
mod problem;
mod rule;
mod rule_generator;
mod rule_set;
mod solver;
mod watch_graph;

pub use pool::{PackageId, SatPool};
pub use rule::{Literal, Rule, RuleType};

use std::time::Instant;

use self::rule_generator::RuleGenerator;
use self::solver::SatSolver;
use super::policy::Policy;
use super::{SolveFailure, SolverFlags};
use crate::database::Database;
use crate::request::{JobAction, Request};

/// Solve `request`, returning the database positions of the records to
/// have installed
pub(crate) fn solve(
    db: &Database,
    pool: &SatPool,
    request: &Request,
    flags: &SolverFlags,
) -> Result<Vec<usize>, SolveFailure> {
    let start = Instant::now();
    let policy = Policy::new(db, request, flags);
    let rules = RuleGenerator::new(db, &policy).generate(request);

    log::debug!(
        "SAT pool: {} names, {} records, {} rules",
        pool.name_count(),
        db.len(),
        rules.len()
    );

    let released = request
        .jobs()
        .iter()
        .filter(|job| matches!(job.action, JobAction::Remove | JobAction::Update))
        .filter_map(|job| job.name())
        .map(str::to_lowercase)
        .collect::<std::collections::HashSet<_>>();

    let mut keep: Vec<usize> = db
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.installed && !released.contains(&r.record.name.to_lowercase()))
        .map(|(index, _)| index)
        .collect();
    policy.sort(&mut keep);

    let mut solver = SatSolver::new(&policy, rules, db.len())
        .with_soft_keep(keep.into_iter().map(SatPool::package_id).collect());

    let outcome = solver.solve();
    log::debug!("SAT search took {:?}", start.elapsed());

    match outcome {
        Ok(ids) => Ok(ids.into_iter().map(SatPool::record_index).collect()),
        Err(problem) => Err(problem.into_failure(solver.rules(), db, request)),
    }
}
