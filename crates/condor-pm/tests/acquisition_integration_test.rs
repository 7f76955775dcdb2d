/// Integration tests for repository acquisition
///
/// A scripted fetcher stands in for the network so that retries, failure
/// aggregation and cancellation can be observed deterministically.

use async_trait::async_trait;
use condor_pm::acquisition::{Acquisition, AcquisitionError, AcquisitionOptions, FetchError, FetchTarget, RepodataFetcher};
use condor_pm::{Config, JobAction, Request, Session};
use condor_spec::RepoData;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Fail transiently this many times, then serve the repodata
    FlakyThenOk(u32),
    /// Answer 404
    Missing,
    /// Never answer
    Hang,
}

#[derive(Default)]
struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    repodata: HashMap<String, String>,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    fn with(mut self, target: &str, script: Script) -> Self {
        self.scripts.insert(target.to_string(), script);
        self
    }

    fn with_repodata(mut self, target: &str, json: &str) -> Self {
        self.repodata.insert(target.to_string(), json.to_string());
        self
    }

    fn attempts(&self, target: &str) -> u32 {
        self.attempts.lock().unwrap().get(target).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RepodataFetcher for ScriptedFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<RepoData, FetchError> {
        let key = target.to_string();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let url = format!("https://mirror.test/{}/repodata.json", key);
        match self.scripts.get(&key).copied().unwrap_or(Script::FlakyThenOk(0)) {
            Script::FlakyThenOk(failures) if attempt <= failures => Err(FetchError::Status { status: 503, url }),
            Script::FlakyThenOk(_) => {
                let json = self.repodata.get(&key).map(String::as_str).unwrap_or("{}");
                RepoData::from_json(json).map_err(|e| FetchError::Decode {
                    url,
                    message: e.to_string(),
                })
            }
            Script::Missing => Err(FetchError::Status { status: 404, url }),
            Script::Hang => std::future::pending().await,
        }
    }
}

fn target(channel: &str, subdir: &str) -> FetchTarget {
    let url = Url::parse(&format!("https://mirror.test/{}", channel)).unwrap();
    FetchTarget::new(channel, subdir, url)
}

fn targets(count: usize) -> Vec<FetchTarget> {
    (0..count).map(|i| target(&format!("chan{}", i), "noarch")).collect()
}

fn fast_options() -> AcquisitionOptions {
    AcquisitionOptions {
        download_threads: 2,
        retry_timeout: Duration::from_millis(1),
        retry_backoff: 1.0,
        ..AcquisitionOptions::default()
    }
}

#[tokio::test]
async fn test_results_follow_request_order() {
    let fetcher = ScriptedFetcher::default().with("chan0/noarch", Script::FlakyThenOk(2));
    let acquisition = Acquisition::new(fetcher, fast_options());

    let fetched = acquisition.fetch_all(targets(5)).await.unwrap();
    let names: Vec<_> = fetched.iter().map(|r| r.target.to_string()).collect();

    assert_eq!(
        names,
        vec!["chan0/noarch", "chan1/noarch", "chan2/noarch", "chan3/noarch", "chan4/noarch"]
    );
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let acquisition = Acquisition::new(SharedFetcher(Arc::clone(&fetcher)), fast_options());

    acquisition.fetch_all(targets(8)).await.unwrap();
    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fetcher = Arc::new(ScriptedFetcher::default().with("chan1/noarch", Script::FlakyThenOk(2)));
    let acquisition = Acquisition::new(SharedFetcher(Arc::clone(&fetcher)), fast_options());

    let fetched = acquisition.fetch_all(targets(2)).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetcher.attempts("chan1/noarch"), 3);
    assert_eq!(fetcher.attempts("chan0/noarch"), 1);
}

#[tokio::test]
async fn test_retries_run_out() {
    let fetcher = Arc::new(ScriptedFetcher::default().with("chan0/noarch", Script::FlakyThenOk(10)));
    let acquisition = Acquisition::new(SharedFetcher(Arc::clone(&fetcher)), fast_options());

    let err = acquisition.fetch_all(targets(1)).await.unwrap_err();
    match &err {
        AcquisitionError::RetriesExhausted { target, attempts, last } => {
            assert_eq!(target, "chan0/noarch");
            assert_eq!(*attempts, 3);
            assert!(matches!(last, FetchError::Status { status: 503, .. }));
        }
        other => panic!("unexpected error {}", other),
    }
    assert!(err.is_transient());
    assert_eq!(fetcher.attempts("chan0/noarch"), 3);
}

#[tokio::test]
async fn test_permanent_failures_are_not_retried() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with("chan0/noarch", Script::Missing)
            .with("chan2/noarch", Script::Missing),
    );
    let acquisition = Acquisition::new(SharedFetcher(Arc::clone(&fetcher)), fast_options());

    let err = acquisition.fetch_all(targets(3)).await.unwrap_err();
    match &err {
        AcquisitionError::Multiple { failures, total } => {
            assert_eq!(failures.len(), 2);
            assert_eq!(*total, 3);
            assert!(failures.iter().all(|f| matches!(f, AcquisitionError::Permanent { .. })));
        }
        other => panic!("unexpected error {}", other),
    }
    assert!(!err.is_transient());
    assert_eq!(fetcher.attempts("chan0/noarch"), 1);
    assert_eq!(fetcher.attempts("chan1/noarch"), 1);
}

#[tokio::test]
async fn test_fail_fast_stops_early() {
    let fetcher = Arc::new(ScriptedFetcher::default().with("chan0/noarch", Script::Missing));
    let options = AcquisitionOptions {
        download_threads: 1,
        fail_fast: true,
        ..fast_options()
    };
    let acquisition = Acquisition::new(SharedFetcher(Arc::clone(&fetcher)), options);

    let err = acquisition.fetch_all(targets(4)).await.unwrap_err();
    assert!(matches!(err, AcquisitionError::Permanent { .. }));
    assert_eq!(fetcher.attempts("chan3/noarch"), 0);
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_fetches() {
    let fetcher = ScriptedFetcher::default().with("chan1/noarch", Script::Hang);
    let acquisition = Acquisition::new(fetcher, fast_options());

    let cancel = tokio::time::sleep(Duration::from_millis(50));
    let err = acquisition.fetch_all_until(targets(2), cancel).await.unwrap_err();
    assert!(matches!(err, AcquisitionError::Cancelled));
}

#[tokio::test]
async fn test_session_solves_fetched_channels() {
    let fetcher = ScriptedFetcher::default()
        .with_repodata(
            "conda-forge/linux-64",
            r#"{"info": {"subdir": "linux-64"}, "packages": {
                "zlib-1.3-h0_0.tar.bz2": {"name": "zlib", "version": "1.3", "build": "h0_0", "depends": []}
            }}"#,
        )
        .with_repodata(
            "conda-forge/noarch",
            r#"{"info": {"subdir": "noarch"}, "packages": {
                "tzdata-2024a-h0_0.tar.bz2": {"name": "tzdata", "version": "2024a", "build": "h0_0", "depends": ["zlib"]}
            }}"#,
        );

    let mut config = Config::default();
    config.channel_alias = "https://mirror.test".to_string();
    config.subdirs = vec!["linux-64".to_string(), "noarch".to_string()];
    config.acquisition = fast_options();

    let mut session = Session::builder()
        .with_config(config)
        .fetch_repositories(fetcher)
        .await
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(session.database().repositories().len(), 3);

    let request = Request::parse([(JobAction::Install, "tzdata")]).unwrap();
    let transaction = session.plan(&request).unwrap();
    let links: Vec<_> = transaction.links().map(|p| p.dist_str()).collect();
    assert_eq!(links, vec!["zlib-1.3-h0_0", "tzdata-2024a-h0_0"]);

    let tzdata = transaction.links().find(|p| p.name == "tzdata").unwrap();
    assert_eq!(tzdata.channel, "conda-forge");
    assert_eq!(tzdata.url, "https://mirror.test/conda-forge/noarch/tzdata-2024a-h0_0.tar.bz2");
}

/// Lets a test keep a handle on the fetcher it hands to [`Acquisition`]
struct SharedFetcher(Arc<ScriptedFetcher>);

#[async_trait]
impl RepodataFetcher for SharedFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<RepoData, FetchError> {
        self.0.fetch(target).await
    }
}
