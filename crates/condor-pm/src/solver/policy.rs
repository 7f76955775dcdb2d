use condor_spec::{MatchSpec, Version};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::SolverFlags;
use crate::database::{Database, StoredRecord};
use crate::request::Request;

/// Why a record is not a candidate even though a spec matches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// A higher priority channel provides the same name
    LowerPriority { priority: i32, required: i32 },
    /// Older than the installed version while downgrades are disabled
    Downgrade { installed: Version },
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::LowerPriority { priority, required } => write!(
                f,
                "channel priority {} is below the strict channel priority {}",
                priority, required
            ),
            Exclusion::Downgrade { installed } => {
                write!(f, "downgrading the installed version {} is not allowed", installed)
            }
        }
    }
}

/// Candidate filtering and ranking shared by both solver backends.
///
/// Records are ranked best-first by:
///
/// 1. the installed record, unless an update job targets its name
/// 2. channel priority, then subpriority
/// 3. version
/// 4. build number
/// 5. timestamp, build string and finally database order
#[derive(Debug, Clone)]
pub struct Policy<'a> {
    db: &'a Database,
    flags: SolverFlags,
    update_names: HashSet<String>,
    installed_versions: HashMap<String, Version>,
    top_priority: HashMap<String, i32>,
}

impl<'a> Policy<'a> {
    pub fn new(db: &'a Database, request: &Request, flags: &SolverFlags) -> Self {
        let mut installed_versions = HashMap::new();
        let mut top_priority: HashMap<String, i32> = HashMap::new();

        for record in db.records() {
            let name = record.record.name.to_lowercase();
            if record.installed {
                installed_versions.insert(name, record.record.version.clone());
            } else {
                top_priority
                    .entry(name)
                    .and_modify(|p| *p = (*p).max(record.priority.priority))
                    .or_insert(record.priority.priority);
            }
        }

        Self {
            db,
            flags: *flags,
            update_names: request.update_names(),
            installed_versions,
            top_priority,
        }
    }

    pub fn flags(&self) -> &SolverFlags {
        &self.flags
    }

    /// Whether the installed record of `name` keeps its preference
    pub fn prefers_installed(&self, name: &str) -> bool {
        !self.update_names.contains(&name.to_lowercase())
    }

    /// The reason `index` may not be selected, if any.
    ///
    /// Installed records are never excluded.
    pub fn exclusion(&self, index: usize) -> Option<Exclusion> {
        let record = self.db.record(index)?;
        if record.installed {
            return None;
        }

        let name = record.record.name.to_lowercase();
        if self.flags.strict_repo_priority {
            if let Some(&required) = self.top_priority.get(&name) {
                if record.priority.priority < required {
                    return Some(Exclusion::LowerPriority {
                        priority: record.priority.priority,
                        required,
                    });
                }
            }
        }

        if !self.flags.allow_downgrade {
            if let Some(installed) = self.installed_versions.get(&name) {
                if record.record.version < *installed {
                    return Some(Exclusion::Downgrade {
                        installed: installed.clone(),
                    });
                }
            }
        }

        None
    }

    pub fn is_allowed(&self, index: usize) -> bool {
        self.exclusion(index).is_none()
    }

    /// Allowed records matching `spec`, in database order
    pub fn candidates(&self, spec: &MatchSpec) -> Vec<usize> {
        self.db
            .candidate_indices(spec)
            .into_iter()
            .filter(|&index| self.is_allowed(index))
            .collect()
    }

    /// Rank two records; `Less` means `a` is preferred
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match (self.db.record(a), self.db.record(b)) {
            (Some(ra), Some(rb)) => self.compare_records(ra, rb).then(a.cmp(&b)),
            _ => a.cmp(&b),
        }
    }

    fn compare_records(&self, a: &StoredRecord, b: &StoredRecord) -> Ordering {
        let (pa, pb) = (&a.record, &b.record);

        let by_name = pa.name.to_lowercase().cmp(&pb.name.to_lowercase());
        if by_name != Ordering::Equal {
            return by_name;
        }

        if self.prefers_installed(&pa.name) && a.installed != b.installed {
            return if a.installed { Ordering::Less } else { Ordering::Greater };
        }

        b.priority
            .cmp(&a.priority)
            .then_with(|| pb.version.cmp(&pa.version))
            .then_with(|| pb.build_number.cmp(&pa.build_number))
            .then_with(|| pb.timestamp.unwrap_or(0).cmp(&pa.timestamp.unwrap_or(0)))
            .then_with(|| pa.build_string.cmp(&pb.build_string))
    }

    /// Sort record positions best-first
    pub fn sort(&self, candidates: &mut [usize]) {
        candidates.sort_by(|&a, &b| self.compare(a, b));
    }

    /// The best of `candidates`
    pub fn best(&self, candidates: impl IntoIterator<Item = usize>) -> Option<usize> {
        candidates.into_iter().min_by(|&a, &b| self.compare(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::record;
    use crate::request::JobAction;
    use crate::solver::SolverKind;

    fn spec(text: &str) -> MatchSpec {
        MatchSpec::parse(text).unwrap()
    }

    fn database() -> Database {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("low", vec![record("foo", "3.0", &[])], 5).unwrap();
        db.add_repository(
            "high",
            vec![
                record("foo", "1.0", &[]),
                record("foo", "2.0", &[]),
                record("foo", "2.0", &[]).with_build_number(3),
            ],
            10,
        )
        .unwrap();
        db.set_installed(vec![record("foo", "1.0", &[])]).unwrap();
        db.create_whatprovides();
        db
    }

    #[test]
    fn test_strict_priority_excludes_lower_channel() {
        let db = database();
        let policy = Policy::new(&db, &Request::new(), &SolverFlags::default());

        assert!(matches!(
            policy.exclusion(0),
            Some(Exclusion::LowerPriority { priority: 5, required: 10 })
        ));
        assert_eq!(policy.candidates(&spec("foo")), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_flexible_priority_keeps_lower_channel() {
        let db = database();
        let flags = SolverFlags {
            strict_repo_priority: false,
            ..SolverFlags::default()
        };
        let policy = Policy::new(&db, &Request::new(), &flags);
        assert!(policy.is_allowed(0));
    }

    #[test]
    fn test_installed_first_then_priority() {
        let db = database();
        let policy = Policy::new(&db, &Request::new(), &SolverFlags::default());

        let mut candidates = vec![0, 1, 2, 3, 4];
        policy.sort(&mut candidates);
        // installed, then priority 10 by version and build number, then priority 5
        assert_eq!(candidates, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_update_drops_installed_preference() {
        let db = database();
        let request = Request::parse([(JobAction::Update, "foo")]).unwrap();
        let policy = Policy::new(&db, &request, &SolverFlags::default());

        assert_eq!(policy.best(policy.candidates(&spec("foo"))), Some(3));
        assert!(!policy.prefers_installed("foo"));
    }

    #[test]
    fn test_downgrade_exclusion() {
        let db = database();
        let flags = SolverFlags {
            allow_downgrade: false,
            strict_repo_priority: false,
            ..SolverFlags::default()
        };
        let policy = Policy::new(&db, &Request::new(), &flags);

        assert!(policy.is_allowed(1));
        assert!(policy.is_allowed(4));
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("c", vec![record("foo", "0.5", &[])], 0).unwrap();
        db.set_installed(vec![record("foo", "1.0", &[])]).unwrap();
        let policy = Policy::new(&db, &Request::new(), &flags);
        assert!(matches!(policy.exclusion(0), Some(Exclusion::Downgrade { .. })));
    }
}
