//! Incremental backend on top of `resolvo`.
//!
//! Candidates and dependencies are handed to the solver only for the names
//! it actually visits, which keeps large repositories cheap when the
//! request touches a small part of them.

pub mod pool;
mod provider;

pub use pool::LazyPool;
pub use provider::{LazyProvider, LazyRecord, LazyVersionSet};

use condor_spec::MatchSpec;
use resolvo::{Problem, UnsolvableOrCancelled};
use std::collections::HashSet;
use std::time::Instant;

use super::policy::Policy;
use super::{SolveFailure, SolverFlags};
use crate::database::Database;
use crate::request::{JobAction, Request};

/// Solve `request`, returning the database positions of the records to
/// have installed
pub(crate) fn solve(
    db: &Database,
    pool: &LazyPool,
    request: &Request,
    flags: &SolverFlags,
) -> Result<Vec<usize>, SolveFailure> {
    let start = Instant::now();
    let provider = LazyProvider::new(db, pool, Policy::new(db, request, flags));

    let mut requirements = Vec::new();
    let mut constraints = Vec::new();
    let mut removed = HashSet::new();
    let mut released = HashSet::new();

    for job in request.jobs() {
        match job.action {
            JobAction::Install | JobAction::Update => {
                requirements.push(provider.requirement(&job.spec));
                if job.action == JobAction::Update {
                    released.extend(job.name().map(str::to_lowercase));
                }
            }
            JobAction::Remove => {
                for name in pool.names().iter().filter(|name| job.spec.name.matches(name)) {
                    constraints.push(provider.version_set(name, job.spec.clone(), true));
                    removed.insert(name.clone());
                }
            }
        }
    }

    for pin in request.pins() {
        if let Some(name) = pin.name() {
            constraints.push(provider.version_set(name, pin.clone(), false));
        }
    }

    let mut keep: Vec<usize> = db
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.installed)
        .map(|(index, _)| index)
        .filter(|&index| {
            db.record(index)
                .map(|r| r.name().to_lowercase())
                .is_some_and(|name| !removed.contains(&name) && !released.contains(&name))
        })
        .collect();
    provider.policy().sort(&mut keep);

    if !flags.allow_uninstall {
        let kept_names: HashSet<String> = keep
            .iter()
            .filter_map(|&index| db.record(index))
            .map(|r| r.name().to_lowercase())
            .collect();
        let mut kept_names: Vec<_> = kept_names.into_iter().collect();
        kept_names.sort();

        for name in kept_names {
            if let Ok(spec) = MatchSpec::from_name(&name) {
                requirements.push(provider.requirement(&spec));
            }
        }
    }

    let soft: Vec<_> = keep.iter().filter_map(|&index| provider.solvable(index)).collect();

    let problem = Problem::new()
        .requirements(requirements)
        .constraints(constraints)
        .soft_requirements(soft);

    let mut solver = resolvo::Solver::new(provider);
    let outcome = solver.solve(problem);
    log::debug!("Lazy search took {:?}", start.elapsed());

    match outcome {
        Ok(solvables) => {
            let mut selected: Vec<usize> = solvables
                .into_iter()
                .map(|s| solver.provider().record_index(s))
                .collect();
            selected.sort_unstable();
            Ok(selected)
        }
        Err(UnsolvableOrCancelled::Unsolvable(conflict)) => {
            let reason = conflict.display_user_friendly(&solver).to_string();
            Err(SolveFailure {
                reason: reason.trim_end().to_string(),
                failing_jobs: failing_jobs(request),
            })
        }
        Err(UnsolvableOrCancelled::Cancelled(_)) => Err(SolveFailure {
            reason: "the solve was cancelled".to_string(),
            failing_jobs: failing_jobs(request),
        }),
    }
}

fn failing_jobs(request: &Request) -> Vec<usize> {
    let jobs = request.install_job_indices();
    if jobs.is_empty() {
        (0..request.jobs().len()).collect()
    } else {
        jobs
    }
}
