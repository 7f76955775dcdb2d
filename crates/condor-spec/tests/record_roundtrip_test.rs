/// Serialization round-trip tests for package records and repodata
///
/// Records coming from repository metadata must serialize back with the
/// identifying fields untouched.

use condor_spec::{MatchSpec, PackageInfo, RepoData};
use serde_json::Value;

const REPODATA: &str = r#"{
    "info": {"subdir": "noarch"},
    "packages": {
        "six-1.16.0-pyh6c4a22f_0.tar.bz2": {
            "build": "pyh6c4a22f_0",
            "build_number": 0,
            "channel": "https://conda.anaconda.org/conda-forge",
            "depends": ["python"],
            "fn": "six-1.16.0-pyh6c4a22f_0.tar.bz2",
            "license": "MIT",
            "md5": "e5f25f8dbc060e9a8d912e432202afc2",
            "name": "six",
            "noarch": "python",
            "subdir": "noarch",
            "timestamp": 1620240338595,
            "url": "https://conda.anaconda.org/conda-forge/noarch/six-1.16.0-pyh6c4a22f_0.tar.bz2",
            "version": "1.16.0"
        },
        "tzdata-2023c-h71feb2d_0.tar.bz2": {
            "build": "h71feb2d_0",
            "build_number": 0,
            "depends": [],
            "name": "tzdata",
            "version": "2023c"
        }
    }
}"#;

fn identifying_fields(value: &Value) -> Vec<Option<String>> {
    ["name", "version", "build", "channel", "url", "fn"]
        .iter()
        .map(|key| value.get(*key).and_then(Value::as_str).map(String::from))
        .collect()
}

#[test]
fn test_record_roundtrip_is_verbatim() {
    let original: Value = serde_json::from_str(REPODATA).unwrap();
    let repodata = RepoData::from_json(REPODATA).unwrap();

    for (file_name, record) in &repodata.packages {
        let serialized = serde_json::to_value(record).unwrap();
        assert_eq!(
            identifying_fields(&serialized),
            identifying_fields(&original["packages"][file_name]),
            "{}",
            file_name
        );

        let reparsed: PackageInfo = serde_json::from_value(serialized).unwrap();
        assert_eq!(&reparsed, record);
    }
}

#[test]
fn test_repodata_roundtrip() {
    let repodata = RepoData::from_json(REPODATA).unwrap();
    let json = serde_json::to_string(&repodata).unwrap();
    let again = RepoData::from_json(&json).unwrap();
    assert_eq!(repodata, again);
}

#[test]
fn test_records_match_their_own_specs() {
    let records = RepoData::from_json(REPODATA)
        .unwrap()
        .into_records("conda-forge", "https://conda.anaconda.org/conda-forge");

    for record in &records {
        let spec = MatchSpec::parse(&format!(
            "conda-forge::{} {} {}",
            record.name, record.version, record.build_string
        ))
        .unwrap();
        assert!(spec.matches(record), "{}", record);
    }
}

#[test]
fn test_tzdata_letter_version_orders() {
    let records = RepoData::from_json(REPODATA)
        .unwrap()
        .into_records("conda-forge", "https://conda.anaconda.org/conda-forge");
    let tzdata = records.iter().find(|r| r.name == "tzdata").unwrap();
    assert!(MatchSpec::parse("tzdata >=2023a").unwrap().matches(tzdata));
    assert!(!MatchSpec::parse("tzdata >=2023d").unwrap().matches(tzdata));
}
