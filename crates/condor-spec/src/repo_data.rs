//! `repodata.json` documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::package_info::PackageInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
}

/// The metadata of one channel subdirectory, keyed by file name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ChannelInfo>,

    #[serde(default)]
    pub packages: IndexMap<String, PackageInfo>,

    #[serde(rename = "packages.conda", default, skip_serializing_if = "IndexMap::is_empty")]
    pub conda_packages: IndexMap<String, PackageInfo>,
}

impl RepoData {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn len(&self) -> usize {
        self.packages.len() + self.conda_packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn the document into records, filling in the fields that are
    /// implied by where the document came from.
    ///
    /// Records keep document order, `.tar.bz2` entries first.
    pub fn into_records(self, channel: &str, base_url: &str) -> Vec<PackageInfo> {
        let subdir = self.info.and_then(|info| info.subdir).unwrap_or_default();
        let base_url = base_url.trim_end_matches('/');

        self.packages
            .into_iter()
            .chain(self.conda_packages)
            .map(|(file_name, mut record)| {
                if record.file_name.is_empty() {
                    record.file_name = file_name;
                }
                if record.channel.is_empty() {
                    record.channel = channel.to_string();
                }
                if record.subdir.is_empty() {
                    record.subdir = subdir.clone();
                }
                if record.url.is_empty() {
                    record.url = format!("{}/{}/{}", base_url, record.subdir, record.file_name);
                }
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPODATA: &str = r#"{
        "info": {"subdir": "linux-64"},
        "packages": {
            "zlib-1.2.13-hd590300_5.tar.bz2": {
                "name": "zlib", "version": "1.2.13", "build": "hd590300_5",
                "build_number": 5, "depends": ["libzlib 1.2.13 hd590300_5"]
            }
        },
        "packages.conda": {
            "libzlib-1.2.13-hd590300_5.conda": {
                "name": "libzlib", "version": "1.2.13", "build": "hd590300_5",
                "build_number": 5, "depends": []
            }
        }
    }"#;

    #[test]
    fn test_into_records_fills_origin() {
        let repodata = RepoData::from_json(REPODATA).unwrap();
        assert_eq!(repodata.len(), 2);

        let records = repodata.into_records("conda-forge", "https://conda.anaconda.org/conda-forge/");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "zlib");
        assert_eq!(records[0].file_name, "zlib-1.2.13-hd590300_5.tar.bz2");
        assert_eq!(records[0].channel, "conda-forge");
        assert_eq!(records[0].subdir, "linux-64");
        assert_eq!(
            records[1].url,
            "https://conda.anaconda.org/conda-forge/linux-64/libzlib-1.2.13-hd590300_5.conda"
        );
    }

    #[test]
    fn test_empty_document() {
        let repodata = RepoData::from_json("{}").unwrap();
        assert!(repodata.is_empty());
        assert!(repodata.into_records("c", "https://example.com").is_empty());
    }
}
