use condor_spec::{MatchSpec, ParseMatchSpecError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What a job asks the solver to do with the packages its spec matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    /// At least one matching record must end up installed
    Install,
    /// No matching record may stay installed
    Remove,
    /// Like install, without preferring what is already installed
    Update,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Install => "install",
            JobAction::Remove => "remove",
            JobAction::Update => "update",
        }
    }

    /// Install and update jobs both demand a package
    pub fn is_install(&self) -> bool {
        matches!(self, JobAction::Install | JobAction::Update)
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub action: JobAction,
    pub spec: MatchSpec,
}

impl Job {
    pub fn new(action: JobAction, spec: MatchSpec) -> Self {
        Self { action, spec }
    }

    /// The exact package name the job targets, if any
    pub fn name(&self) -> Option<&str> {
        self.spec.name()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.spec)
    }
}

/// An ordered list of jobs plus the pin constraints that apply to them.
///
/// Job order is significant: identical databases and job lists always
/// produce identical solutions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    jobs: Vec<Job>,
    pins: Vec<MatchSpec>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a batch of `(action, spec)` pairs.
    ///
    /// The first malformed spec fails the whole batch.
    pub fn parse<I, S>(jobs: I) -> Result<Self, ParseMatchSpecError>
    where
        I: IntoIterator<Item = (JobAction, S)>,
        S: AsRef<str>,
    {
        let jobs = jobs
            .into_iter()
            .map(|(action, spec)| MatchSpec::parse(spec.as_ref()).map(|spec| Job::new(action, spec)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { jobs, pins: Vec::new() })
    }

    pub fn push(&mut self, job: Job) -> &mut Self {
        self.jobs.push(job);
        self
    }

    pub fn install(&mut self, spec: MatchSpec) -> &mut Self {
        self.push(Job::new(JobAction::Install, spec))
    }

    pub fn remove(&mut self, spec: MatchSpec) -> &mut Self {
        self.push(Job::new(JobAction::Remove, spec))
    }

    pub fn update(&mut self, spec: MatchSpec) -> &mut Self {
        self.push(Job::new(JobAction::Update, spec))
    }

    /// Constrain any installed record of the spec's name to match it
    pub fn pin(&mut self, spec: MatchSpec) -> &mut Self {
        if !self.pins.contains(&spec) {
            self.pins.push(spec);
        }
        self
    }

    pub fn with_pins<I: IntoIterator<Item = MatchSpec>>(mut self, pins: I) -> Self {
        for pin in pins {
            self.pin(pin);
        }
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn pins(&self) -> &[MatchSpec] {
        &self.pins
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Names targeted by update jobs; these lose the installed preference
    pub fn update_names(&self) -> HashSet<String> {
        self.names_for(|action| action == JobAction::Update)
    }

    /// Names targeted by install or update jobs
    pub fn requested_names(&self) -> HashSet<String> {
        self.names_for(|action| action.is_install())
    }

    fn names_for(&self, keep: impl Fn(JobAction) -> bool) -> HashSet<String> {
        self.jobs
            .iter()
            .filter(|job| keep(job.action))
            .filter_map(|job| job.name().map(str::to_string))
            .collect()
    }

    /// Indices of the install and update jobs
    pub fn install_job_indices(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.action.is_install())
            .map(|(index, _)| index)
            .collect()
    }

    /// Job strings in request order, as recorded in the history log
    pub fn describe(&self) -> Vec<String> {
        self.jobs.iter().map(ToString::to_string).collect()
    }
}
