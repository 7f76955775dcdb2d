use condor_spec::{MatchSpec, PackageInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::source::{ConfigLoader, ConfigSource, RawConfig};
use crate::acquisition::{AcquisitionOptions, FetchTarget};
use crate::error::{CondorError, Result};
use crate::pins::{pin_config_specs, pin_file_specs, pin_python_spec, PinSet};
use crate::solver::{SolverFlags, SolverKind};

const DEFAULT_CHANNEL_ALIAS: &str = "https://conda.anaconda.org";

/// Keys understood in configuration files and as `CONDOR_*` variables
pub const CONFIG_KEYS: &[&str] = &[
    "solver",
    "channels",
    "channel-alias",
    "subdirs",
    "pinned-packages",
    "pin-file",
    "allow-uninstall",
    "allow-downgrade",
    "force-reinstall",
    "strict-channel-priority",
    "download-threads",
    "max-retries",
    "retry-timeout",
    "retry-backoff",
    "fail-fast",
    "history-path",
];

/// The conda subdir of the running platform
pub fn native_subdir() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => "linux-64",
        ("linux", "aarch64") => "linux-aarch64",
        ("linux", "powerpc64") => "linux-ppc64le",
        ("macos", "x86_64") => "osx-64",
        ("macos", "aarch64") => "osx-arm64",
        ("windows", "x86_64") => "win-64",
        ("windows", "aarch64") => "win-arm64",
        _ => "noarch",
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub solver: SolverKind,
    pub channels: Vec<String>,
    pub channel_alias: String,
    pub subdirs: Vec<String>,
    pub pinned_packages: Vec<String>,
    pub pin_file: Option<PathBuf>,
    pub solver_flags: SolverFlags,
    pub acquisition: AcquisitionOptions,
    pub history_path: Option<PathBuf>,

    #[serde(skip)]
    home_dir: Option<PathBuf>,
    #[serde(skip)]
    data_dir: Option<PathBuf>,
    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        let mut subdirs = vec![native_subdir().to_string()];
        if subdirs[0] != "noarch" {
            subdirs.push("noarch".to_string());
        }

        Self {
            solver: SolverKind::default(),
            channels: vec!["conda-forge".to_string()],
            channel_alias: DEFAULT_CHANNEL_ALIAS.to_string(),
            subdirs,
            pinned_packages: Vec::new(),
            pin_file: None,
            solver_flags: SolverFlags::default(),
            acquisition: AcquisitionOptions::default(),
            history_path: None,
            home_dir: None,
            data_dir: None,
            sources: HashMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer defaults, the global `config.json`, `config_file` and, when
    /// `use_environment` is set, `CONDOR_*` variables
    pub fn build<P: AsRef<Path>>(config_file: Option<P>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        for key in CONFIG_KEYS {
            config.sources.insert(key.to_string(), ConfigSource::Default);
        }

        let global = loader.load_global_config()?;
        config.merge_raw_config(global, ConfigSource::Global)?;

        if let Some(path) = &config_file {
            let path = path.as_ref();
            if !path.exists() {
                return Err(CondorError::Config(format!("{} does not exist", path.display())));
            }
            let raw = loader.load_config_file(path)?;
            config.merge_raw_config(raw, ConfigSource::File(path.to_path_buf()))?;
        }

        if use_environment {
            config.apply_env_overrides(&loader)?;
        }

        config.home_dir = Some(loader.get_condor_home());
        config.data_dir = Some(loader.get_data_dir());

        log::debug!("Configuration built with solver {}", config.solver);
        Ok(config)
    }

    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Set a value as if it came from a configuration file
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.merge_config_value(key, value, ConfigSource::Command)
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    /// Where the history log lives: `history-path`, or `history.jsonl` in
    /// the data directory
    pub fn get_history_path(&self) -> Option<PathBuf> {
        self.history_path
            .clone()
            .or_else(|| self.data_dir.as_ref().map(|dir| dir.join("history.jsonl")))
    }

    /// One fetch target per channel and subdir, channels first
    pub fn fetch_targets(&self) -> Result<Vec<FetchTarget>> {
        let alias = Url::parse(&self.channel_alias)
            .map_err(|e| CondorError::Config(format!("Invalid channel-alias {}: {}", self.channel_alias, e)))?;

        let mut targets = Vec::with_capacity(self.channels.len() * self.subdirs.len());
        for channel in &self.channels {
            for subdir in &self.subdirs {
                let target = FetchTarget::resolve(channel, subdir, &alias)
                    .map_err(|e| CondorError::Config(e.to_string()))?;
                targets.push(target);
            }
        }
        Ok(targets)
    }

    /// Pins for a solve: the installed python series, then configured pins,
    /// then the pin file
    pub fn pins(&self, installed: &[Arc<PackageInfo>], specs: &[MatchSpec]) -> Result<PinSet> {
        let python = pin_python_spec(installed, specs).into_iter().collect::<Vec<_>>();
        let configured = pin_config_specs(self.pinned_packages.as_slice())?;
        let from_file = match &self.pin_file {
            Some(path) => pin_file_specs(path)?,
            None => Vec::new(),
        };

        Ok(PinSet::merge([python, configured, from_file]))
    }

    fn merge_raw_config(&mut self, raw: RawConfig, source: ConfigSource) -> Result<()> {
        for (key, value) in raw.values {
            self.merge_config_value(&key, value, source.clone())?;
        }
        Ok(())
    }

    fn merge_config_value(&mut self, key: &str, value: Value, source: ConfigSource) -> Result<()> {
        let invalid = || CondorError::Config(format!("Invalid value for {}: {}", key, value));

        match key {
            "solver" => {
                self.solver = as_string(&value)
                    .and_then(|s| SolverKind::from_str(&s))
                    .ok_or_else(invalid)?;
            }
            "channels" => self.channels = as_list(&value).ok_or_else(invalid)?,
            "channel-alias" => self.channel_alias = as_string(&value).ok_or_else(invalid)?,
            "subdirs" => self.subdirs = as_list(&value).ok_or_else(invalid)?,
            "pinned-packages" => self.pinned_packages = as_list(&value).ok_or_else(invalid)?,
            "pin-file" => self.pin_file = Some(as_string(&value).map(PathBuf::from).ok_or_else(invalid)?),
            "history-path" => self.history_path = Some(as_string(&value).map(PathBuf::from).ok_or_else(invalid)?),
            "allow-uninstall" => self.solver_flags.allow_uninstall = as_bool(&value).ok_or_else(invalid)?,
            "allow-downgrade" => self.solver_flags.allow_downgrade = as_bool(&value).ok_or_else(invalid)?,
            "force-reinstall" => self.solver_flags.force_reinstall = as_bool(&value).ok_or_else(invalid)?,
            "strict-channel-priority" => {
                self.solver_flags.strict_repo_priority = as_bool(&value).ok_or_else(invalid)?;
            }
            "download-threads" => {
                self.acquisition.download_threads = as_u64(&value).map(|n| n as usize).ok_or_else(invalid)?;
            }
            "max-retries" => {
                self.acquisition.max_retries = as_u64(&value).map(|n| n as u32).ok_or_else(invalid)?;
            }
            "retry-timeout" => {
                self.acquisition.retry_timeout = as_f64(&value)
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    .ok_or_else(invalid)?;
            }
            "retry-backoff" => self.acquisition.retry_backoff = as_f64(&value).ok_or_else(invalid)?,
            "fail-fast" => self.acquisition.fail_fast = as_bool(&value).ok_or_else(invalid)?,
            _ => {
                log::debug!("Ignoring unknown config key {}", key);
                return Ok(());
            }
        }

        self.sources.insert(key.to_string(), source);
        Ok(())
    }

    fn apply_env_overrides(&mut self, loader: &ConfigLoader) -> Result<()> {
        for key in CONFIG_KEYS {
            if let Some(raw) = loader.get_env_config(key) {
                let var = ConfigLoader::env_var_name(key);
                self.merge_config_value(key, Value::String(raw), ConfigSource::Environment(var))?;
            }
        }
        Ok(())
    }
}

// Environment values arrive as strings, so every accessor also accepts the
// string form of its type.

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn as_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
