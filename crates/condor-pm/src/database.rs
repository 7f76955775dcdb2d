//! The package database: every repository's records plus one solver-specific
//! index over them.

use condor_spec::{MatchSpec, PackageInfo};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CondorError, ParseError, Result};
use crate::repository::{Priorities, RepoId, Repository};
use crate::solver::lazy::LazyPool;
use crate::solver::sat::SatPool;
use crate::solver::SolverKind;

/// Name of the repository holding the installed records
pub const INSTALLED_REPO_NAME: &str = "installed";

/// A record together with the data the solvers need about it.
///
/// `depends` and `constrains` are parsed once when the repository is added.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: Arc<PackageInfo>,
    pub repo: RepoId,
    pub priority: Priorities,
    pub installed: bool,
    pub depends: Vec<MatchSpec>,
    pub constrains: Vec<MatchSpec>,
}

impl StoredRecord {
    fn parse(record: PackageInfo, repo: RepoId, priority: Priorities, installed: bool) -> Result<Self> {
        let invalid = |source| ParseError::Record {
            record: record.dist_str(),
            source,
        };
        let depends = record.dependencies().map_err(invalid)?;
        let constrains = record.constraints().map_err(invalid)?;

        Ok(Self {
            record: Arc::new(record),
            repo,
            priority,
            installed,
            depends,
            constrains,
        })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

/// Name lookup shared by both solver backends
pub trait PackageIndex {
    /// Rebuild the what-provides index over `records`
    fn create_whatprovides(&mut self, records: &[StoredRecord]);

    /// Positions of the records published under `name`, or `None` while the
    /// index has not been built
    fn providers(&self, name: &str) -> Option<&[usize]>;
}

/// The solver-specific representation owned by a database
#[derive(Debug, Clone)]
pub enum Backend {
    Sat(SatPool),
    Lazy(LazyPool),
}

impl Backend {
    fn new(kind: SolverKind) -> Self {
        match kind {
            SolverKind::Sat => Backend::Sat(SatPool::default()),
            SolverKind::Lazy => Backend::Lazy(LazyPool::default()),
        }
    }

    fn kind(&self) -> SolverKind {
        match self {
            Backend::Sat(_) => SolverKind::Sat,
            Backend::Lazy(_) => SolverKind::Lazy,
        }
    }

    fn index(&self) -> &dyn PackageIndex {
        match self {
            Backend::Sat(pool) => pool,
            Backend::Lazy(pool) => pool,
        }
    }

    fn index_mut(&mut self) -> &mut dyn PackageIndex {
        match self {
            Backend::Sat(pool) => pool,
            Backend::Lazy(pool) => pool,
        }
    }
}

/// Records matching a spec, in database order.
///
/// The iterator is lazy and finite; it cannot be restarted.
pub struct CandidateIter<'a> {
    inner: Box<dyn Iterator<Item = &'a PackageInfo> + 'a>,
}

impl<'a> Iterator for CandidateIter<'a> {
    type Item = &'a PackageInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// All repositories known to a solve, plus the installed records.
///
/// The database is built for one solver backend and refuses to be used
/// with the other. Cloning it is cheap enough for what-if solves.
#[derive(Debug, Clone)]
pub struct Database {
    repositories: Vec<Repository>,
    records: Vec<StoredRecord>,
    installed: Option<RepoId>,
    backend: Backend,
    stale: bool,
}

impl Database {
    pub fn new(kind: SolverKind) -> Self {
        Self {
            repositories: Vec::new(),
            records: Vec::new(),
            installed: None,
            backend: Backend::new(kind),
            stale: true,
        }
    }

    /// The backend this database was built for
    pub fn kind(&self) -> SolverKind {
        self.backend.kind()
    }

    /// Add a repository.
    ///
    /// Every record's `depends` and `constrains` are parsed first; a single
    /// malformed entry rejects the whole repository and leaves the database
    /// unchanged.
    pub fn add_repository<I>(&mut self, name: &str, records: I, priority: impl Into<Priorities>) -> Result<RepoId>
    where
        I: IntoIterator<Item = PackageInfo>,
    {
        self.push_repository(name, records, priority.into(), false)
    }

    /// Set the records currently installed in the environment, replacing any
    /// earlier installed set
    pub fn set_installed<I>(&mut self, records: I) -> Result<RepoId>
    where
        I: IntoIterator<Item = PackageInfo>,
    {
        if let Some(previous) = self.installed.take() {
            self.records.retain(|r| r.repo != previous);
            self.repositories.retain(|r| r.id != previous);
        }

        let id = self.push_repository(INSTALLED_REPO_NAME, records, Priorities::default(), true)?;
        self.installed = Some(id);
        Ok(id)
    }

    fn push_repository<I>(&mut self, name: &str, records: I, priority: Priorities, installed: bool) -> Result<RepoId>
    where
        I: IntoIterator<Item = PackageInfo>,
    {
        let id = RepoId(self.repositories.iter().map(|r| r.id.0 + 1).max().unwrap_or(0));
        let parsed = records
            .into_iter()
            .map(|record| StoredRecord::parse(record, id, priority, installed))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Adding repository {} ({} records, priority {}/{})",
            name,
            parsed.len(),
            priority.priority,
            priority.subpriority
        );

        self.repositories
            .push(Repository::new(id, name, priority, installed, parsed.len()));
        self.records.extend(parsed);
        self.stale = true;

        Ok(id)
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn repository(&self, id: RepoId) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.id == id)
    }

    /// Id of the installed repository, once [`Database::set_installed`] ran
    pub fn installed_repo(&self) -> Option<RepoId> {
        self.installed
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&StoredRecord> {
        self.records.get(index)
    }

    pub fn installed_records(&self) -> impl Iterator<Item = &StoredRecord> {
        self.records.iter().filter(|r| r.installed)
    }

    /// The installed records, in the order they were given
    pub fn installed_packages(&self) -> Vec<Arc<PackageInfo>> {
        self.installed_records().map(|r| Arc::clone(&r.record)).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the name index used by candidate queries.
    ///
    /// Calling this again on an unmodified database does nothing.
    pub fn create_whatprovides(&mut self) {
        if !self.stale {
            log::debug!("What-provides index is current, skipping rebuild");
            return;
        }

        let start = Instant::now();
        self.backend.index_mut().create_whatprovides(&self.records);
        self.stale = false;

        log::debug!(
            "Built what-provides index over {} records in {:?}",
            self.records.len(),
            start.elapsed()
        );
    }

    /// Whether the index reflects every added repository
    pub fn has_whatprovides(&self) -> bool {
        !self.stale
    }

    /// Positions of the records named `name`
    pub fn records_named(&self, name: &str) -> Vec<usize> {
        if !self.stale {
            if let Some(indices) = self.backend.index().providers(name) {
                return indices.to_vec();
            }
            return Vec::new();
        }

        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.record.name.eq_ignore_ascii_case(name))
            .map(|(index, _)| index)
            .collect()
    }

    /// Positions of the records matching `spec`, in database order
    pub fn candidate_indices(&self, spec: &MatchSpec) -> Vec<usize> {
        match spec.name() {
            Some(name) => self
                .records_named(name)
                .into_iter()
                .filter(|&index| spec.matches(&self.records[index].record))
                .collect(),
            None => self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| spec.matches(&r.record))
                .map(|(index, _)| index)
                .collect(),
        }
    }

    pub fn has_package(&self, spec: &MatchSpec) -> bool {
        self.iter_candidates(spec).next().is_some()
    }

    /// Iterate over the records matching `spec`
    pub fn iter_candidates<'a>(&'a self, spec: &'a MatchSpec) -> CandidateIter<'a> {
        let indexed = match spec.name() {
            Some(name) if !self.stale => self.backend.index().providers(name),
            _ => None,
        };

        let inner: Box<dyn Iterator<Item = &'a PackageInfo> + 'a> = match indexed {
            Some(indices) => Box::new(
                indices
                    .iter()
                    .map(move |&index| self.records[index].record.as_ref())
                    .filter(move |record| spec.matches(record)),
            ),
            None if !self.stale && spec.name().is_some() => Box::new(std::iter::empty()),
            None => Box::new(
                self.records
                    .iter()
                    .map(|r| r.record.as_ref())
                    .filter(move |record| spec.matches(record)),
            ),
        };

        CandidateIter { inner }
    }

    /// Distinct record names, in first-seen order
    pub fn names(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .map(|r| r.record.name.as_str())
            .filter(|name| seen.insert(name.to_lowercase()))
            .collect()
    }

    pub fn sat_pool(&self) -> Result<&SatPool> {
        match &self.backend {
            Backend::Sat(pool) => Ok(pool),
            other => Err(CondorError::BackendMismatch {
                expected: SolverKind::Sat,
                found: other.kind(),
            }),
        }
    }

    pub fn lazy_pool(&self) -> Result<&LazyPool> {
        match &self.backend {
            Backend::Lazy(pool) => Ok(pool),
            other => Err(CondorError::BackendMismatch {
                expected: SolverKind::Lazy,
                found: other.kind(),
            }),
        }
    }
}
