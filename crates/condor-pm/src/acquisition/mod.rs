//! Concurrent retrieval of repository metadata.
//!
//! [`Acquisition`] runs up to `download_threads` fetches at once on a
//! [`JoinSet`], retrying transient failures per [`RetryPolicy`].

mod fetcher;
mod retry;

pub use fetcher::{FetchTarget, HttpFetcher, RepodataFetcher};
pub use retry::RetryPolicy;

use condor_spec::{PackageInfo, RepoData};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;

/// Failure of a single fetch attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status}: {url}")]
    Status { status: u16, url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid repodata from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid channel URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Server errors, rate limiting and transport failures may succeed on a
    /// later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Transport { .. } => true,
            FetchError::Decode { .. } | FetchError::InvalidUrl { .. } => false,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum AcquisitionError {
    #[error("Fetching {target} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        last: FetchError,
    },

    #[error("Fetching {target} failed: {source}")]
    Permanent {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("{count} of {total} repositories could not be fetched", count = .failures.len())]
    Multiple {
        failures: Vec<AcquisitionError>,
        total: usize,
    },

    #[error("Fetch task failed: {0}")]
    Task(String),

    #[error("Repository acquisition was cancelled")]
    Cancelled,
}

impl AcquisitionError {
    /// Whether running the acquisition again could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AcquisitionError::RetriesExhausted { .. } => true,
            AcquisitionError::Multiple { failures, .. } => failures.iter().all(AcquisitionError::is_transient),
            _ => false,
        }
    }
}

/// Knobs for [`Acquisition`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AcquisitionOptions {
    /// Fetches running at once
    pub download_threads: usize,
    /// Attempts per target, including the first
    pub max_retries: u32,
    /// Wait after the first failed attempt, in seconds
    #[serde(with = "seconds")]
    pub retry_timeout: Duration,
    /// Factor applied to the wait after each further failure
    pub retry_backoff: f64,
    /// Abort everything on the first failed target
    pub fail_fast: bool,
    /// Return results in request order instead of completion order
    pub sort: bool,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            download_threads: 5,
            max_retries: 3,
            retry_timeout: Duration::from_secs(2),
            retry_backoff: 3.0,
            fail_fast: false,
            sort: true,
        }
    }
}

impl AcquisitionOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_timeout, self.retry_backoff)
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Repodata fetched for one target
#[derive(Debug, Clone)]
pub struct FetchedRepo {
    pub target: FetchTarget,
    pub repodata: RepoData,
}

impl FetchedRepo {
    /// Records with channel, subdir and URL filled in from the target
    pub fn into_records(self) -> Vec<PackageInfo> {
        let base_url = self.target.base_url();
        self.repodata.into_records(&self.target.channel, &base_url)
    }
}

type FetchOutcome = (usize, Result<FetchedRepo, AcquisitionError>);

pub struct Acquisition<F> {
    fetcher: Arc<F>,
    options: AcquisitionOptions,
}

impl<F: RepodataFetcher + 'static> Acquisition<F> {
    pub fn new(fetcher: F, options: AcquisitionOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            options,
        }
    }

    pub fn options(&self) -> &AcquisitionOptions {
        &self.options
    }

    /// Fetch every target
    pub async fn fetch_all(&self, targets: Vec<FetchTarget>) -> Result<Vec<FetchedRepo>, AcquisitionError> {
        self.fetch_all_until(targets, std::future::pending()).await
    }

    /// Fetch every target unless `cancel` completes first, in which case all
    /// in-flight fetches are aborted and awaited before returning
    /// [`AcquisitionError::Cancelled`]
    pub async fn fetch_all_until<C>(
        &self,
        targets: Vec<FetchTarget>,
        cancel: C,
    ) -> Result<Vec<FetchedRepo>, AcquisitionError>
    where
        C: Future<Output = ()>,
    {
        let start = Instant::now();
        let total = targets.len();
        let mut queue = targets.into_iter().enumerate();
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();

        for _ in 0..self.options.download_threads.max(1) {
            if let Some((position, target)) = queue.next() {
                self.spawn(&mut tasks, position, target);
            }
        }

        tokio::pin!(cancel);
        let mut fetched = Vec::with_capacity(total);
        let mut failures = Vec::new();

        loop {
            let joined = tokio::select! {
                biased;
                _ = &mut cancel => {
                    log::info!("Cancelling {} in-flight fetches", tasks.len());
                    tasks.shutdown().await;
                    return Err(AcquisitionError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let failure = match joined {
                Ok((position, Ok(repo))) => {
                    fetched.push((position, repo));
                    None
                }
                Ok((_, Err(err))) => Some(err),
                Err(err) => Some(AcquisitionError::Task(err.to_string())),
            };

            if let Some(err) = failure {
                if self.options.fail_fast {
                    log::debug!("Aborting {} fetches after failure: {}", tasks.len(), err);
                    tasks.shutdown().await;
                    return Err(err);
                }
                failures.push(err);
            }

            if let Some((position, target)) = queue.next() {
                self.spawn(&mut tasks, position, target);
            }
        }

        log::info!(
            "Fetched {} of {} repositories in {:?}",
            fetched.len(),
            total,
            start.elapsed()
        );

        match failures.len() {
            0 => {}
            1 => return Err(failures.remove(0)),
            _ => return Err(AcquisitionError::Multiple { failures, total }),
        }

        if self.options.sort {
            fetched.sort_by_key(|(position, _)| *position);
        }
        Ok(fetched.into_iter().map(|(_, repo)| repo).collect())
    }

    fn spawn(&self, tasks: &mut JoinSet<FetchOutcome>, position: usize, target: FetchTarget) {
        let fetcher = Arc::clone(&self.fetcher);
        let retry = self.options.retry_policy();

        tasks.spawn(async move {
            let label = target.to_string();
            let outcome = retry.run(&label, || fetcher.fetch(&target)).await;
            (position, outcome.map(|repodata| FetchedRepo { target, repodata }))
        });
    }
}
