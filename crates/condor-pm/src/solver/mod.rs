//! Dependency resolution.
//!
//! [`Solver`] dispatches to one of two backends chosen when the
//! [`Database`](crate::Database) was built:
//!
//! - [`sat`]: rule generation over the whole candidate pool, solved with
//!   conflict-driven clause learning
//! - [`lazy`]: an incremental solver that asks for candidates and
//!   dependencies only when it needs them
//!
//! Both rank candidates with the same [`Policy`] and return a [`Solution`],
//! or an [`Unsolvable`] verdict that can explain itself.

pub mod lazy;
pub mod policy;
pub mod sat;
mod unsolvable;

pub use policy::{Exclusion, Policy};
pub use unsolvable::Unsolvable;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use crate::database::Database;
use crate::error::Result;
use crate::request::Request;
use crate::solution::Solution;

/// The two solving backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Sat,
    Lazy,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Sat => "sat",
            SolverKind::Lazy => "lazy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sat" | "libsolv" => Some(SolverKind::Sat),
            "lazy" | "resolvo" => Some(SolverKind::Lazy),
            _ => None,
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switches that change what counts as an acceptable solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SolverFlags {
    /// Installed packages may be removed to satisfy the request
    pub allow_uninstall: bool,
    /// Candidates older than the installed version are acceptable
    pub allow_downgrade: bool,
    /// Requested packages that are already installed get reinstalled
    pub force_reinstall: bool,
    /// Only the highest priority channel providing a name is considered
    pub strict_repo_priority: bool,
}

impl Default for SolverFlags {
    fn default() -> Self {
        Self {
            allow_uninstall: true,
            allow_downgrade: true,
            force_reinstall: false,
            strict_repo_priority: true,
        }
    }
}

/// Why a backend gave up, before it is turned into an [`Unsolvable`]
#[derive(Debug, Clone)]
pub(crate) struct SolveFailure {
    pub reason: String,
    pub failing_jobs: Vec<usize>,
}

/// Entry point for solving a request against a database
#[derive(Debug, Clone, Default)]
pub struct Solver {
    kind: SolverKind,
    flags: SolverFlags,
}

impl Solver {
    pub fn new(kind: SolverKind) -> Self {
        Self {
            kind,
            flags: SolverFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: SolverFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn flags(&self) -> &SolverFlags {
        &self.flags
    }

    /// Solve `request` against `db`.
    ///
    /// Builds the what-provides index if needed. Fails with
    /// `BackendMismatch` when the database was built for the other backend,
    /// and with `Unsolvable` when no consistent set exists.
    pub fn solve(&self, db: &mut Database, request: &Request) -> Result<Solution> {
        match self.kind {
            SolverKind::Sat => db.sat_pool().map(|_| ())?,
            SolverKind::Lazy => db.lazy_pool().map(|_| ())?,
        }

        db.create_whatprovides();
        let db: &Database = db;

        let start = Instant::now();
        let outcome = match self.kind {
            SolverKind::Sat => sat::solve(db, db.sat_pool()?, request, &self.flags),
            SolverKind::Lazy => lazy::solve(db, db.lazy_pool()?, request, &self.flags),
        };

        match outcome {
            Ok(selected) => {
                log::info!(
                    "{} solver selected {} packages in {:?}",
                    self.kind,
                    selected.len(),
                    start.elapsed()
                );

                let selected: Vec<_> = selected
                    .into_iter()
                    .filter_map(|index| db.record(index).map(|r| std::sync::Arc::clone(&r.record)))
                    .collect();

                let reinstall: HashSet<String> = if self.flags.force_reinstall {
                    request.requested_names()
                } else {
                    HashSet::new()
                };

                Ok(Solution::from_selection(&db.installed_packages(), &selected, &reinstall))
            }
            Err(failure) => {
                log::info!("{} solver found no solution in {:?}", self.kind, start.elapsed());
                log::debug!("Unsolvable: {}", failure.reason);

                Err(Unsolvable::new(failure.reason, request.clone(), failure.failing_jobs, self.flags).into())
            }
        }
    }
}
