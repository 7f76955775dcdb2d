//! From solver verdict to an ordered list of filesystem steps.

mod compiler;
mod plan;
mod python;

pub use compiler::TransactionCompiler;
pub use plan::{check_paths, dependencies_first, dependents_first};
pub use python::PythonChange;

use condor_spec::{PackageInfo, PackageKey};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One filesystem-affecting step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Remove a package's files from the environment
    Unlink(Arc<PackageInfo>),
    /// Place a package's files into the environment
    Link(Arc<PackageInfo>),
    /// Rebuild the bytecode of a noarch python package
    Recompile(Arc<PackageInfo>),
}

impl PlanStep {
    pub fn package(&self) -> &Arc<PackageInfo> {
        match self {
            PlanStep::Unlink(p) | PlanStep::Link(p) | PlanStep::Recompile(p) => p,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStep::Unlink(_) => "unlink",
            PlanStep::Link(_) => "link",
            PlanStep::Recompile(_) => "recompile",
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_str(), self.package().dist_str())
    }
}

/// Ordered steps: every unlink, then every link, then recompiles
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    steps: Vec<PlanStep>,
    python_change: Option<PythonChange>,
    pub(crate) history_id: Option<u64>,
}

impl Transaction {
    pub fn new(steps: Vec<PlanStep>, python_change: Option<PythonChange>) -> Self {
        Self {
            steps,
            python_change,
            history_id: None,
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn links(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.steps.iter().filter_map(|s| match s {
            PlanStep::Link(p) => Some(p),
            _ => None,
        })
    }

    pub fn unlinks(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.steps.iter().filter_map(|s| match s {
            PlanStep::Unlink(p) => Some(p),
            _ => None,
        })
    }

    pub fn recompiles(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.steps.iter().filter_map(|s| match s {
            PlanStep::Recompile(p) => Some(p),
            _ => None,
        })
    }

    pub fn python_change(&self) -> Option<&PythonChange> {
        self.python_change.as_ref()
    }

    /// Id of the history entry written for this transaction
    pub fn history_id(&self) -> Option<u64> {
        self.history_id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn summary(&self) -> TransactionSummary {
        let unlinked: HashSet<PackageKey> = self.unlinks().map(|p| p.key()).collect();
        let reinstall = self.links().filter(|p| unlinked.contains(&p.key())).count();

        TransactionSummary {
            link: self.links().count(),
            unlink: self.unlinks().count(),
            reinstall,
            recompile: self.recompiles().count(),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Step counts of a transaction. A reinstall is counted both as a link and
/// an unlink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionSummary {
    pub link: usize,
    pub unlink: usize,
    pub reinstall: usize,
    pub recompile: usize,
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if self.link > 0 {
            parts.push(format!("{} link(s)", self.link));
        }
        if self.unlink > 0 {
            parts.push(format!("{} unlink(s)", self.unlink));
        }
        if self.reinstall > 0 {
            parts.push(format!("{} reinstall(s)", self.reinstall));
        }
        if self.recompile > 0 {
            parts.push(format!("{} recompile(s)", self.recompile));
        }

        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
