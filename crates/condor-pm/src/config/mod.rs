//! Configuration loading.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. `config.json` in the condor home directory
//! 3. An explicitly given configuration file
//! 4. `CONDOR_*` environment variables (`download-threads` is read from
//!    `CONDOR_DOWNLOAD_THREADS`)
//!
//! The source of every key is recorded and available through
//! [`Config::get_source`].

mod config;
mod source;

pub use config::{native_subdir, Config, CONFIG_KEYS};
pub use source::{ConfigLoader, ConfigSource, RawConfig};
