use async_trait::async_trait;
use condor_spec::RepoData;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use url::Url;

use super::FetchError;

const DEFAULT_USER_AGENT: &str = concat!("condor/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the index of one channel subdirectory lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    /// Channel name recorded on every fetched record
    pub channel: String,
    pub subdir: String,
    pub channel_url: Url,
}

impl FetchTarget {
    pub fn new(channel: impl Into<String>, subdir: impl Into<String>, channel_url: Url) -> Self {
        Self {
            channel: channel.into(),
            subdir: subdir.into(),
            channel_url,
        }
    }

    /// Resolve a channel given as a name (`conda-forge`) against
    /// `channel_alias`, or as a full URL
    pub fn resolve(channel: &str, subdir: &str, channel_alias: &Url) -> Result<Self, FetchError> {
        let invalid = |e: url::ParseError| FetchError::InvalidUrl {
            url: channel.to_string(),
            message: e.to_string(),
        };

        let channel_url = if channel.contains("://") {
            Url::parse(channel).map_err(invalid)?
        } else {
            with_trailing_slash(channel_alias.clone())
                .join(channel.trim_matches('/'))
                .map_err(invalid)?
        };

        let name = channel_url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or(channel)
            .to_string();

        Ok(Self::new(name, subdir, channel_url))
    }

    /// Base URL that record file names are relative to
    pub fn base_url(&self) -> String {
        self.channel_url.as_str().trim_end_matches('/').to_string()
    }

    pub fn repodata_url(&self) -> Result<Url, FetchError> {
        with_trailing_slash(self.channel_url.clone())
            .join(&format!("{}/repodata.json", self.subdir))
            .map_err(|e| FetchError::InvalidUrl {
                url: self.channel_url.to_string(),
                message: e.to_string(),
            })
    }
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.subdir)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Source of repository metadata
#[async_trait]
pub trait RepodataFetcher: Send + Sync {
    async fn fetch(&self, target: &FetchTarget) -> Result<RepoData, FetchError>;
}

/// Fetches `repodata.json` over HTTP(S), or from disk for `file://`
/// channels
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url.to_file_path().map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
            message: "not a local path".to_string(),
        })?;

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                url: url.to_string(),
            },
            _ => FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            },
        })
    }

    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RepodataFetcher for HttpFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<RepoData, FetchError> {
        let url = target.repodata_url()?;
        log::debug!("Fetching {}", url);

        let bytes = if url.scheme() == "file" {
            self.fetch_file(&url).await?
        } else {
            self.fetch_http(&url).await?
        };

        RepoData::from_slice(&bytes).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
