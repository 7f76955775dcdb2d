//! Package metadata types for the condor package manager
//!
//! This crate provides conda-style version parsing and ordering, version range
//! expressions, match specifications and the serializable package record that
//! the solver consumes.

mod match_spec;
mod operator;
mod package_info;
mod repo_data;
mod version;
mod version_spec;

pub use match_spec::{BuildNumberSpec, MatchSpec, ParseMatchSpecError, StringMatcher};
pub use operator::{InvalidOperatorError, Operator};
pub use package_info::{NoArch, PackageInfo, PackageKey};
pub use repo_data::{ChannelInfo, RepoData};
pub use version::{ParseVersionError, Version};
pub use version_spec::{ParseVersionSpecError, VersionSpec};
