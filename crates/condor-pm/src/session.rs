//! The engine assembled: configuration, package database and history.

use condor_spec::{MatchSpec, PackageInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::acquisition::{Acquisition, RepodataFetcher};
use crate::config::Config;
use crate::database::Database;
use crate::error::{CondorError, Result};
use crate::history::History;
use crate::repository::Priorities;
use crate::request::Request;
use crate::solution::Solution;
use crate::solver::Solver;
use crate::transaction::{dependencies_first, dependents_first, PlanStep, Transaction, TransactionCompiler};

/// Solves requests against one environment and keeps its history.
pub struct Session {
    config: Config,
    database: Database,
    history: History,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn installed(&self) -> Vec<Arc<PackageInfo>> {
        self.database.installed_packages()
    }

    fn requested_specs(request: &Request) -> Vec<MatchSpec> {
        request
            .jobs()
            .iter()
            .filter(|j| j.action.is_install())
            .map(|j| j.spec.clone())
            .collect()
    }

    fn compiler_for(&self, request: &Request) -> Result<TransactionCompiler> {
        let installed = self.installed();
        let pins = self.config.pins(&installed, &Self::requested_specs(request))?;
        Ok(TransactionCompiler::new(installed, pins.into_specs()))
    }

    /// Solve `request` with the configured pins applied
    pub fn solve(&mut self, request: &Request) -> Result<Solution> {
        let compiler = self.compiler_for(request)?;
        compiler.check_pins(request)?;

        let request = request.clone().with_pins(compiler.pins().iter().cloned());
        Solver::new(self.config.solver)
            .with_flags(self.config.solver_flags)
            .solve(&mut self.database, &request)
    }

    /// Solve `request` and compile the result into a transaction, recording
    /// it in the history.
    ///
    /// Pin conflicts are reported before the solver runs.
    pub fn plan(&mut self, request: &Request) -> Result<Transaction> {
        let start = Instant::now();
        let compiler = self.compiler_for(request)?;
        compiler.check_pins(request)?;

        let request = request.clone().with_pins(compiler.pins().iter().cloned());
        let solution = Solver::new(self.config.solver)
            .with_flags(self.config.solver_flags)
            .solve(&mut self.database, &request)?;

        let transaction = compiler.compile(&solution, &request, &mut self.history)?;
        log::info!("Planned {} in {:?}", transaction.summary(), start.elapsed());
        Ok(transaction)
    }

    /// Make the environment after `transaction` the installed set
    pub fn commit(&mut self, transaction: &Transaction) -> Result<()> {
        let unlinked: Vec<_> = transaction.unlinks().map(|p| p.key()).collect();
        let mut installed: Vec<PackageInfo> = self
            .installed()
            .into_iter()
            .filter(|p| !unlinked.contains(&p.key()))
            .map(|p| p.as_ref().clone())
            .collect();
        installed.extend(transaction.links().map(|p| p.as_ref().clone()));

        self.database.set_installed(installed)?;
        Ok(())
    }

    /// Plan the steps that restore the environment of history revision
    /// `revision`, and record the rollback
    pub fn rollback(&mut self, revision: u64) -> Result<Transaction> {
        let current = self.history.current_state();
        let target = self.history.state_at(revision);

        let by_dist: HashMap<String, Arc<PackageInfo>> = self
            .database
            .records()
            .iter()
            .rev()
            .map(|r| (r.record.dist_str(), Arc::clone(&r.record)))
            .collect();

        let mut links = Vec::new();
        for dist in target.difference(&current) {
            let package = by_dist
                .get(dist)
                .ok_or_else(|| CondorError::History(format!("{} is not available in any repository", dist)))?;
            links.push(Arc::clone(package));
        }

        let unlinks: Vec<_> = self
            .installed()
            .into_iter()
            .filter(|p| current.contains(&p.dist_str()) && !target.contains(&p.dist_str()))
            .collect();

        let entry_id = self.history.rollback(revision)?.id;

        let mut steps: Vec<PlanStep> = dependents_first(unlinks).into_iter().map(PlanStep::Unlink).collect();
        steps.extend(dependencies_first(links).into_iter().map(PlanStep::Link));

        let mut transaction = Transaction::new(steps, None);
        transaction.history_id = Some(entry_id);
        Ok(transaction)
    }
}

/// Assembles a [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    config: Option<Config>,
    history: Option<History>,
    repositories: Vec<(String, Vec<PackageInfo>, Priorities)>,
    installed: Vec<PackageInfo>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_repository(
        mut self,
        name: impl Into<String>,
        records: Vec<PackageInfo>,
        priority: impl Into<Priorities>,
    ) -> Self {
        self.repositories.push((name.into(), records, priority.into()));
        self
    }

    pub fn with_installed(mut self, records: Vec<PackageInfo>) -> Self {
        self.installed = records;
        self
    }

    /// Fetch every configured channel and subdir.
    ///
    /// Earlier channels get higher priority; within a channel, earlier
    /// subdirs get higher subpriority.
    pub async fn fetch_repositories<F: RepodataFetcher + 'static>(mut self, fetcher: F) -> Result<Self> {
        let config = self.config.clone().unwrap_or_default();
        let targets = config.fetch_targets()?;

        let channels = config.channels.len() as i32;
        let subdirs = config.subdirs.len() as i32;
        let priorities: HashMap<_, _> = targets
            .iter()
            .enumerate()
            .map(|(i, target)| {
                let i = i as i32;
                (
                    target.clone(),
                    Priorities::new(channels - i / subdirs.max(1), subdirs - i % subdirs.max(1)),
                )
            })
            .collect();

        let fetched = Acquisition::new(fetcher, config.acquisition.clone())
            .fetch_all(targets)
            .await?;

        for repo in fetched {
            let priority = priorities.get(&repo.target).copied().unwrap_or_default();
            let name = repo.target.to_string();
            self.repositories.push((name, repo.into_records(), priority));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Session> {
        let config = self.config.unwrap_or_default();
        let mut database = Database::new(config.solver);

        for (name, records, priority) in self.repositories {
            database.add_repository(&name, records, priority)?;
        }
        database.set_installed(self.installed)?;

        let history = match (self.history, &config.history_path) {
            (Some(history), _) => history,
            (None, Some(path)) => History::open(path)?,
            (None, None) => History::in_memory(),
        };

        Ok(Session {
            config,
            database,
            history,
        })
    }
}
