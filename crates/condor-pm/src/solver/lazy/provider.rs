use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use condor_spec::{MatchSpec, PackageInfo, PackageKey};
use resolvo::utils::{Pool, VersionSet};
use resolvo::{
    Candidates, Dependencies, DependencyProvider, Interner, KnownDependencies, NameId, Requirement, SolvableId,
    SolverCache, StringId, VersionSetId, VersionSetUnionId,
};

use super::pool::LazyPool;
use crate::database::{Database, PackageIndex};
use crate::solver::policy::Policy;

/// A spec as seen by the solver. `negate` flips the match, which is how
/// remove jobs become constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LazyVersionSet {
    pub spec: MatchSpec,
    pub negate: bool,
}

impl fmt::Display for LazyVersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "not {}", self.spec)
        } else {
            write!(f, "{}", self.spec)
        }
    }
}

impl VersionSet for LazyVersionSet {
    type V = LazyRecord;
}

/// A database record handed to the solver
#[derive(Debug, Clone)]
pub struct LazyRecord {
    pub index: usize,
    pub package: Arc<PackageInfo>,
}

impl fmt::Display for LazyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.package)
    }
}

/// Feeds database records to resolvo one name at a time.
///
/// Names, specs and records are interned only when the solver asks for
/// them; candidate filtering and ordering go through the shared [`Policy`].
pub struct LazyProvider<'a> {
    db: &'a Database,
    names: &'a LazyPool,
    policy: Policy<'a>,
    pool: Pool<LazyVersionSet, String>,
    solvables: RefCell<HashMap<usize, SolvableId>>,
}

impl<'a> LazyProvider<'a> {
    pub fn new(db: &'a Database, names: &'a LazyPool, policy: Policy<'a>) -> Self {
        Self {
            db,
            names,
            policy,
            pool: Pool::new(),
            solvables: RefCell::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &Policy<'a> {
        &self.policy
    }

    pub fn name_id(&self, name: &str) -> NameId {
        self.pool.intern_package_name(name.to_lowercase())
    }

    pub fn version_set(&self, name: &str, spec: MatchSpec, negate: bool) -> VersionSetId {
        let name = self.name_id(name);
        self.pool.intern_version_set(name, LazyVersionSet { spec, negate })
    }

    /// Requirement for `spec`; a glob name becomes a union over the names
    /// it matches
    pub fn requirement(&self, spec: &MatchSpec) -> Requirement {
        if let Some(name) = spec.name() {
            return Requirement::Single(self.version_set(name, spec.clone(), false));
        }

        let mut sets = self
            .names
            .names()
            .iter()
            .filter(|name| spec.name.matches(name))
            .map(|name| self.version_set(name, spec.clone(), false));

        match sets.next() {
            None => Requirement::Single(self.version_set(spec.name.as_str(), spec.clone(), false)),
            Some(first) => {
                let rest: Vec<_> = sets.collect();
                if rest.is_empty() {
                    Requirement::Single(first)
                } else {
                    Requirement::Union(self.pool.intern_version_set_union(first, rest.into_iter()))
                }
            }
        }
    }

    /// The solvable for a database position, interned on first use
    pub fn solvable(&self, index: usize) -> Option<SolvableId> {
        if let Some(&id) = self.solvables.borrow().get(&index) {
            return Some(id);
        }

        let stored = self.db.record(index)?;
        let name = self.name_id(stored.name());
        let id = self.pool.intern_solvable(
            name,
            LazyRecord {
                index,
                package: Arc::clone(&stored.record),
            },
        );
        self.solvables.borrow_mut().insert(index, id);
        Some(id)
    }

    /// Database position of a solvable
    pub fn record_index(&self, solvable: SolvableId) -> usize {
        self.pool.resolve_solvable(solvable).record.index
    }
}

impl Interner for LazyProvider<'_> {
    fn display_solvable(&self, solvable: SolvableId) -> impl fmt::Display + '_ {
        self.pool.resolve_solvable(solvable).record.to_string()
    }

    fn display_merged_solvables(&self, solvables: &[SolvableId]) -> impl fmt::Display + '_ {
        let mut records: Vec<&LazyRecord> = solvables
            .iter()
            .map(|&s| &self.pool.resolve_solvable(s).record)
            .collect();
        records.sort_by(|a, b| b.package.version.cmp(&a.package.version));

        let name = records.first().map(|r| r.package.name.clone()).unwrap_or_default();
        let versions: Vec<String> = records.iter().map(|r| r.package.version.to_string()).collect();
        format!("{} {}", name, versions.join(" | "))
    }

    fn display_name(&self, name: NameId) -> impl fmt::Display + '_ {
        self.pool.resolve_package_name(name)
    }

    fn display_version_set(&self, version_set: VersionSetId) -> impl fmt::Display + '_ {
        self.pool.resolve_version_set(version_set)
    }

    fn display_string(&self, string_id: StringId) -> impl fmt::Display + '_ {
        self.pool.resolve_string(string_id)
    }

    fn version_set_name(&self, version_set: VersionSetId) -> NameId {
        self.pool.resolve_version_set_package_name(version_set)
    }

    fn solvable_name(&self, solvable: SolvableId) -> NameId {
        self.pool.resolve_solvable(solvable).name
    }

    fn version_sets_in_union(&self, version_set_union: VersionSetUnionId) -> impl Iterator<Item = VersionSetId> {
        self.pool.resolve_version_set_union(version_set_union)
    }
}

impl DependencyProvider for LazyProvider<'_> {
    async fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let set = self.pool.resolve_version_set(version_set);
        candidates
            .iter()
            .copied()
            .filter(|&s| {
                let record = &self.pool.resolve_solvable(s).record;
                (set.spec.matches(&record.package) != set.negate) != inverse
            })
            .collect()
    }

    async fn get_candidates(&self, name: NameId) -> Option<Candidates> {
        let name = self.pool.resolve_package_name(name).clone();
        let indices = self.names.providers(&name)?;
        let prefers_installed = self.policy.prefers_installed(&name);

        // A repository copy of an installed record stands for the same package
        let installed: HashSet<PackageKey> = indices
            .iter()
            .filter_map(|&index| self.db.record(index))
            .filter(|r| r.installed)
            .map(|r| r.record.key())
            .collect();

        let mut candidates = Candidates::default();
        for &index in indices {
            let duplicate = self
                .db
                .record(index)
                .is_some_and(|r| !r.installed && installed.contains(&r.record.key()));
            if duplicate {
                continue;
            }
            let Some(id) = self.solvable(index) else {
                continue;
            };
            candidates.candidates.push(id);

            if let Some(exclusion) = self.policy.exclusion(index) {
                let reason = self.pool.intern_string(exclusion.to_string());
                candidates.excluded.push((id, reason));
            } else if prefers_installed && self.db.record(index).is_some_and(|r| r.installed) {
                candidates.favored = Some(id);
            }
        }

        log::trace!("{} candidates for {}", candidates.candidates.len(), name);
        Some(candidates)
    }

    async fn sort_candidates(&self, _solver: &SolverCache<Self>, solvables: &mut [SolvableId]) {
        solvables.sort_by(|&a, &b| self.policy.compare(self.record_index(a), self.record_index(b)));
    }

    async fn get_dependencies(&self, solvable: SolvableId) -> Dependencies {
        let index = self.record_index(solvable);
        let Some(stored) = self.db.record(index) else {
            let reason = self.pool.intern_string(format!("record #{} is missing", index));
            return Dependencies::Unknown(reason);
        };

        let requirements = stored.depends.iter().map(|dep| self.requirement(dep)).collect();
        let constrains = stored
            .constrains
            .iter()
            .filter_map(|c| c.name().map(|name| self.version_set(name, c.clone(), false)))
            .collect();

        Dependencies::Known(KnownDependencies {
            requirements,
            constrains,
        })
    }

    fn should_cancel_with_value(&self) -> Option<Box<dyn std::any::Any>> {
        None
    }
}
