use std::fmt;
use std::hash::{Hash, Hasher};

use super::pool::PackageId;

/// A literal in SAT terms: positive means "install", negative means "don't install"
pub type Literal = i32;

/// What produced a rule; used when explaining failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// An install or update job: one of these candidates must be installed
    RootRequire,
    /// Package dependency: if A is installed, then B|C|D must be installed
    PackageRequires,
    /// A `constrains` entry: A and B cannot both be installed
    PackageConstrains,
    /// Records sharing a name: at most one can be installed
    MultiConflict,
    /// A record that does not satisfy a pin
    Pinned,
    /// A record matched by a remove job
    Removed,
    /// An installed name that must stay installed
    KeepInstalled,
    /// Learned clause from conflict analysis
    Learned,
}

impl RuleType {
    pub fn is_multi_conflict(&self) -> bool {
        matches!(self, RuleType::MultiConflict)
    }
}

/// A disjunction of literals.
///
/// # Examples
///
/// - `[A]` - package A must be installed
/// - `[-A]` - package A must not be installed
/// - `[-A, B, C]` - if A is installed, then B or C must be installed
/// - `[-A, -B]` - A and B cannot both be installed
#[derive(Clone)]
pub struct Rule {
    literals: Vec<Literal>,
    rule_type: RuleType,
    id: u32,
    /// Job that produced this rule
    job: Option<usize>,
    /// Package whose metadata produced this rule
    source: Option<PackageId>,
    /// The spec behind the rule, for messages
    spec: Option<String>,
}

impl Rule {
    pub fn new(literals: Vec<Literal>, rule_type: RuleType) -> Self {
        Self {
            literals,
            rule_type,
            id: 0,
            job: None,
            source: None,
            spec: None,
        }
    }

    /// One of `targets` must be installed for job `job`
    pub fn root_require(targets: Vec<PackageId>, job: usize) -> Self {
        Self::new(targets, RuleType::RootRequire).with_job(job)
    }

    /// If `source` is installed, one of `targets` must be
    pub fn requires(source: PackageId, targets: Vec<PackageId>) -> Self {
        let mut literals = Vec::with_capacity(targets.len() + 1);
        literals.push(-source);
        literals.extend(targets);
        Self::new(literals, RuleType::PackageRequires).with_source(source)
    }

    /// `source` and `other` cannot both be installed
    pub fn constrains(source: PackageId, other: PackageId) -> Self {
        Self::new(vec![-source, -other], RuleType::PackageConstrains).with_source(source)
    }

    /// At most one of `packages` can be installed
    pub fn multi_conflict(packages: Vec<PackageId>) -> Self {
        let literals = packages.into_iter().map(|p| -p).collect();
        Self::new(literals, RuleType::MultiConflict)
    }

    pub fn pinned(package: PackageId) -> Self {
        Self::new(vec![-package], RuleType::Pinned).with_source(package)
    }

    pub fn removed(package: PackageId, job: usize) -> Self {
        Self::new(vec![-package], RuleType::Removed)
            .with_source(package)
            .with_job(job)
    }

    /// One record of an installed name must stay installed
    pub fn keep_installed(targets: Vec<PackageId>) -> Self {
        Self::new(targets, RuleType::KeepInstalled)
    }

    pub fn learned(literals: Vec<Literal>) -> Self {
        Self::new(literals, RuleType::Learned)
    }

    pub fn with_job(mut self, job: usize) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_source(mut self, package: PackageId) -> Self {
        self.source = Some(package);
        self
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn job(&self) -> Option<usize> {
        self.job
    }

    pub fn source(&self) -> Option<PackageId> {
        self.source
    }

    pub fn spec(&self) -> Option<&str> {
        self.spec.as_deref()
    }

    pub fn is_assertion(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn is_multi_conflict(&self) -> bool {
        self.rule_type.is_multi_conflict()
    }

    /// Hash of the sorted literals, type and job; equal rules hash equally
    pub fn literal_hash(&self) -> u64 {
        let mut sorted = self.literals.clone();
        sorted.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        sorted.hash(&mut hasher);
        self.rule_type.hash(&mut hasher);
        self.job.hash(&mut hasher);
        hasher.finish()
    }

    pub fn equals_literals(&self, other: &Rule) -> bool {
        if self.literals.len() != other.literals.len()
            || self.rule_type != other.rule_type
            || self.job != other.job
        {
            return false;
        }
        let mut a = self.literals.clone();
        let mut b = other.literals.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule#{} {:?} {:?}", self.id, self.rule_type, self.literals)?;
        if let Some(job) = self.job {
            write!(f, " job={}", job)?;
        }
        Ok(())
    }
}
