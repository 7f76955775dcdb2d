use condor_spec::{MatchSpec, PackageInfo};
use std::sync::Arc;
use std::time::Instant;

use super::plan::{check_paths, dependencies_first, dependents_first};
use super::python::PythonChange;
use super::{PlanStep, Transaction};
use crate::error::{CondorError, Result};
use crate::history::History;
use crate::request::Request;
use crate::solution::{ActionKind, Solution};

/// Turns a [`Solution`] into an ordered [`Transaction`]
#[derive(Debug, Clone, Default)]
pub struct TransactionCompiler {
    installed: Vec<Arc<PackageInfo>>,
    pins: Vec<MatchSpec>,
}

impl TransactionCompiler {
    pub fn new(installed: Vec<Arc<PackageInfo>>, pins: Vec<MatchSpec>) -> Self {
        Self { installed, pins }
    }

    pub fn installed(&self) -> &[Arc<PackageInfo>] {
        &self.installed
    }

    pub fn pins(&self) -> &[MatchSpec] {
        &self.pins
    }

    /// Fail when a pin and an explicit install or update job ask for
    /// different versions of the same name
    pub fn check_pins(&self, request: &Request) -> Result<()> {
        for job in request.jobs().iter().filter(|j| j.action.is_install()) {
            let (Some(name), Some(requested)) = (job.name(), &job.spec.version) else {
                continue;
            };

            for pin in &self.pins {
                let Some(pinned) = &pin.version else {
                    continue;
                };
                if pin.name() == Some(name) && pinned.to_string() != requested.to_string() {
                    return Err(CondorError::PinViolation {
                        name: name.to_string(),
                        pinned: pin.to_string(),
                        requested: job.spec.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Order the solution into unlink, link and recompile steps and record
    /// the result in `history`.
    ///
    /// A solution that changes nothing yields an empty transaction and no
    /// history entry.
    pub fn compile(&self, solution: &Solution, request: &Request, history: &mut History) -> Result<Transaction> {
        let start = Instant::now();
        self.check_pins(request)?;

        let mut to_remove = Vec::new();
        let mut to_install = Vec::new();
        let mut kept = Vec::new();

        for action in solution.iter() {
            let package = Arc::clone(&action.package);
            match action.kind {
                ActionKind::Remove => to_remove.push(package),
                ActionKind::Install => to_install.push(package),
                ActionKind::Reinstall => {
                    to_remove.push(Arc::clone(&package));
                    to_install.push(package);
                }
                ActionKind::Omit => kept.push(package),
            }
        }

        check_paths(&to_install, &kept)?;

        let python_change = PythonChange::detect(&self.installed, &to_install);

        let mut steps: Vec<PlanStep> = Vec::with_capacity(to_remove.len() + to_install.len());
        steps.extend(dependents_first(to_remove).into_iter().map(PlanStep::Unlink));
        steps.extend(dependencies_first(to_install).into_iter().map(PlanStep::Link));

        if let Some(change) = python_change.as_ref().filter(|c| c.needs_recompile()) {
            log::info!("{} is not bytecode compatible, recompiling noarch packages", change);
            let noarch: Vec<_> = solution
                .resulting_environment()
                .filter(|p| p.is_noarch_python())
                .cloned()
                .collect();
            steps.extend(dependencies_first(noarch).into_iter().map(PlanStep::Recompile));
        }

        let mut transaction = Transaction::new(steps, python_change);

        if !transaction.is_empty() {
            let requested = request.describe();
            let link = transaction.links().map(|p| p.dist_str()).collect();
            let unlink = transaction.unlinks().map(|p| p.dist_str()).collect();
            transaction.history_id = Some(history.record(requested, link, unlink)?);
        }

        log::info!("Compiled transaction ({}) in {:?}", transaction.summary(), start.elapsed());
        Ok(transaction)
    }
}
