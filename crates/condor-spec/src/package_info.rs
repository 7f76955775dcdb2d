use serde::{Deserialize, Serialize};
use std::fmt;

use crate::match_spec::{MatchSpec, ParseMatchSpecError};
use crate::version::Version;

/// The `noarch` field of a record: either a legacy boolean or a kind such
/// as `python` or `generic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoArch {
    Flag(bool),
    Kind(String),
}

impl NoArch {
    pub fn is_python(&self) -> bool {
        matches!(self, NoArch::Kind(kind) if kind == "python")
    }
}

/// Identity of a record within one database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub name: String,
    pub version: Version,
    pub build: String,
    pub channel: String,
}

/// A concrete package as described by repository metadata.
///
/// Dependencies and constraints are kept as the spec strings found in the
/// metadata so that serialization reproduces them exactly; use
/// [`PackageInfo::dependencies`] and [`PackageInfo::constraints`] for the
/// parsed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,

    pub version: Version,

    #[serde(rename = "build")]
    pub build_string: String,

    #[serde(default)]
    pub build_number: u64,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constrains: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,

    #[serde(default)]
    pub subdir: String,

    #[serde(rename = "fn", default)]
    pub file_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noarch: Option<NoArch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Paths written into the environment, relative to its root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl PackageInfo {
    /// Create a record with the required fields; everything else is empty
    pub fn new(name: impl Into<String>, version: Version, build_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            build_string: build_string.into(),
            build_number: 0,
            depends: Vec::new(),
            constrains: Vec::new(),
            channel: String::new(),
            subdir: String::new(),
            file_name: String::new(),
            url: String::new(),
            size: None,
            md5: None,
            sha256: None,
            timestamp: None,
            noarch: None,
            license: None,
            files: Vec::new(),
        }
    }

    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = build_number;
        self
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constrains<I, S>(mut self, constrains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constrains = constrains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    pub fn with_noarch(mut self, noarch: NoArch) -> Self {
        self.noarch = Some(noarch);
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Parsed `depends` entries
    pub fn dependencies(&self) -> Result<Vec<MatchSpec>, ParseMatchSpecError> {
        self.depends.iter().map(|d| MatchSpec::parse(d)).collect()
    }

    /// Parsed `constrains` entries
    pub fn constraints(&self) -> Result<Vec<MatchSpec>, ParseMatchSpecError> {
        self.constrains.iter().map(|c| MatchSpec::parse(c)).collect()
    }

    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.to_lowercase(),
            version: self.version.clone(),
            build: self.build_string.clone(),
            channel: self.channel.to_lowercase(),
        }
    }

    /// `name-version-build`, the conventional distribution name
    pub fn dist_str(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.build_string)
    }

    /// `channel/subdir::name-version-build`
    pub fn long_str(&self) -> String {
        match (self.channel.is_empty(), self.subdir.is_empty()) {
            (true, _) => self.dist_str(),
            (false, true) => format!("{}::{}", self.channel, self.dist_str()),
            (false, false) => format!("{}/{}::{}", self.channel, self.subdir, self.dist_str()),
        }
    }

    pub fn is_noarch_python(&self) -> bool {
        self.noarch.as_ref().is_some_and(NoArch::is_python)
    }
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.build_string.is_empty() {
            write!(f, "{} {}", self.name, self.version)
        } else {
            write!(f, "{} {} {}", self.name, self.version, self.build_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "name": "numpy",
        "version": "1.26.0",
        "build": "py311h64a7726_0",
        "build_number": 0,
        "depends": ["python >=3.11,<3.12.0a0", "libblas >=3.9.0,<4.0a0"],
        "constrains": ["numpy-base <0a0"],
        "channel": "https://conda.anaconda.org/conda-forge",
        "subdir": "linux-64",
        "fn": "numpy-1.26.0-py311h64a7726_0.conda",
        "url": "https://conda.anaconda.org/conda-forge/linux-64/numpy-1.26.0-py311h64a7726_0.conda",
        "size": 8136104,
        "md5": "bf3bbd4a8ed48b5c9c2dd8a1ed3e2dd4",
        "timestamp": 1695291205000
    }"#;

    #[test]
    fn test_deserialize_record() {
        let record: PackageInfo = serde_json::from_str(RECORD).unwrap();
        assert_eq!(record.name, "numpy");
        assert_eq!(record.version.as_str(), "1.26.0");
        assert_eq!(record.build_string, "py311h64a7726_0");
        assert_eq!(record.depends.len(), 2);
        assert_eq!(record.size, Some(8136104));
        assert!(record.noarch.is_none());
    }

    #[test]
    fn test_parsed_dependencies() {
        let record: PackageInfo = serde_json::from_str(RECORD).unwrap();
        let deps = record.dependencies().unwrap();
        assert_eq!(deps[0].name(), Some("python"));
        assert_eq!(record.constraints().unwrap()[0].name(), Some("numpy-base"));

        let broken = record.clone().with_depends(["python >=3..1"]);
        assert!(broken.dependencies().is_err());
    }

    #[test]
    fn test_noarch_forms() {
        let python: PackageInfo =
            serde_json::from_str(r#"{"name":"six","version":"1.16","build":"pyh6c4a22f_0","noarch":"python"}"#)
                .unwrap();
        assert!(python.is_noarch_python());

        let legacy: PackageInfo =
            serde_json::from_str(r#"{"name":"x","version":"1","build":"0","noarch":true}"#).unwrap();
        assert_eq!(legacy.noarch, Some(NoArch::Flag(true)));
        assert!(!legacy.is_noarch_python());
    }

    #[test]
    fn test_key_and_strings() {
        let record = PackageInfo::new("Foo", Version::parse("1.0").unwrap(), "h1_0")
            .with_channel("conda-forge")
            .with_subdir("noarch");
        assert_eq!(record.key().name, "foo");
        assert_eq!(record.dist_str(), "Foo-1.0-h1_0");
        assert_eq!(record.long_str(), "conda-forge/noarch::Foo-1.0-h1_0");
        assert_eq!(record.to_string(), "Foo 1.0 h1_0");
    }

    #[test]
    fn test_key_ignores_trailing_zeros() {
        let a = PackageInfo::new("foo", Version::parse("1.0").unwrap(), "0");
        let b = PackageInfo::new("foo", Version::parse("1.0.0").unwrap(), "0");
        assert_eq!(a.key(), b.key());
    }
}
