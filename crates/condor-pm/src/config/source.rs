use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CondorError, Result};

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// `config.json` in the condor home directory
    Global,
    /// A file passed explicitly
    File(PathBuf),
    /// A `CONDOR_*` environment variable
    Environment(String),
    /// Set programmatically
    Command,
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::Global => "global",
            ConfigSource::File(_) => "file",
            ConfigSource::Environment(var) => var,
            ConfigSource::Command => "command",
        }
    }
}

/// A configuration file before its values are checked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(flatten)]
    pub values: IndexMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    pub fn use_environment(&self) -> bool {
        self.use_environment
    }

    /// A non-empty environment variable, when the environment is consulted
    pub fn get_condor_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// `foo-bar` -> `CONDOR_FOO_BAR`
    pub fn env_var_name(key: &str) -> String {
        format!("CONDOR_{}", key.replace('-', "_").to_uppercase())
    }

    /// The environment override for a configuration key
    pub fn get_env_config(&self, key: &str) -> Option<String> {
        self.get_condor_env(&Self::env_var_name(key))
    }

    pub fn get_condor_home(&self) -> PathBuf {
        if let Some(home) = self.get_condor_env("CONDOR_HOME") {
            return PathBuf::from(home);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "condor") {
            dirs.config_dir().to_path_buf()
        } else if let Some(base) = directories::BaseDirs::new() {
            base.home_dir().join(".condor")
        } else {
            PathBuf::from(".condor")
        }
    }

    pub fn get_cache_dir(&self) -> PathBuf {
        if let Some(cache) = self.get_condor_env("CONDOR_CACHE_DIR") {
            return PathBuf::from(cache);
        }

        match directories::ProjectDirs::from("", "", "condor") {
            Some(dirs) => dirs.cache_dir().to_path_buf(),
            None => self.get_condor_home().join("cache"),
        }
    }

    pub fn get_data_dir(&self) -> PathBuf {
        if let Some(home) = self.get_condor_env("CONDOR_HOME") {
            return PathBuf::from(home);
        }

        match directories::ProjectDirs::from("", "", "condor") {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => self.get_condor_home(),
        }
    }

    /// Read a JSON configuration file; a missing file is empty
    pub fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RawConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CondorError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| CondorError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn load_global_config(&self) -> Result<RawConfig> {
        self.load_config_file(self.get_condor_home().join("config.json"))
    }
}
