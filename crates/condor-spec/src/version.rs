//! Conda-style version numbers.
//!
//! A version is an optional `epoch!` prefix, a main part made of segments
//! separated by `.`, `_` or `-`, and an optional `+local` suffix. Each segment
//! is split into numeric and alphabetic components:
//!
//! - numbers compare numerically and sort above strings
//! - strings compare lexicographically (case-insensitive)
//! - `dev` sorts below every other component, `post` above
//! - missing components and segments are padded with `0`
//!
//! so `1.0dev < 1.0a1 < 1.0rc1 < 1.0 == 1.0.0 < 1.0post1 < 1.1dev1`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref COMPONENT_RE: Regex = Regex::new(r"\d+|[a-z]+").unwrap();
}

static ZERO: Component = Component::Number(0);

/// Errors produced while parsing a version string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseVersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid characters in version '{0}'")]
    InvalidCharacters(String),

    #[error("invalid epoch in version '{0}'")]
    InvalidEpoch(String),

    #[error("empty version segment in '{0}'")]
    EmptySegment(String),

    #[error("numeric component out of range in '{0}'")]
    NumberOutOfRange(String),
}

/// A single version component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Component {
    Dev,
    Iden(String),
    Number(u64),
    Post,
}

type Segment = Vec<Component>;

/// A parsed, comparable version.
///
/// The original text is kept so that serialization reproduces the input
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    source: String,
    epoch: u64,
    segments: Vec<Segment>,
    local: Vec<Segment>,
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self, ParseVersionError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(ParseVersionError::Empty);
        }

        let lowered = source.to_lowercase();
        let (epoch, rest) = match lowered.split_once('!') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u64>()
                    .map_err(|_| ParseVersionError::InvalidEpoch(source.to_string()))?;
                (epoch, rest)
            }
            None => (0, lowered.as_str()),
        };

        let (main, local) = match rest.split_once('+') {
            Some((main, local)) => (main, Some(local)),
            None => (rest, None),
        };

        let segments = parse_segments(main, source)?;
        let local = match local {
            Some(local) => parse_segments(local, source)?,
            None => Vec::new(),
        };

        Ok(Self {
            source: source.to_string(),
            epoch,
            segments,
            local,
        })
    }

    /// The version as it was written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of segments in the main part (`3.10.4` has three)
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Leading number of the first segment
    pub fn major(&self) -> Option<u64> {
        self.leading_number(0)
    }

    /// Leading number of the second segment
    pub fn minor(&self) -> Option<u64> {
        self.leading_number(1)
    }

    fn leading_number(&self, index: usize) -> Option<u64> {
        match self.segments.get(index).and_then(|s| s.first()) {
            Some(Component::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// True when the first `count` segments of both versions are equal
    pub fn segments_equal(&self, other: &Version, count: usize) -> bool {
        self.epoch == other.epoch
            && (0..count).all(|i| {
                compare_components(segment_at(&self.segments, i), segment_at(&other.segments, i))
                    == Ordering::Equal
            })
    }

    /// Whether this version is a compatible successor of `older` at the given
    /// depth: it is not older and shares the first `level` segments.
    ///
    /// `3.10.9` is compatible with `3.10.4` at level 2, `3.11.0` is not.
    pub fn compatible_with(&self, older: &Version, level: usize) -> bool {
        self >= older && self.segments_equal(older, level)
    }

    /// Prefix match used by `1.2.*` style specs.
    ///
    /// All segments but the last must be equal; the components of the last
    /// prefix segment must lead the corresponding segment of this version.
    pub fn starts_with(&self, prefix: &Version) -> bool {
        if self.epoch != prefix.epoch {
            return false;
        }

        let last = prefix.segments.len().saturating_sub(1);
        for (i, prefix_segment) in prefix.segments.iter().enumerate() {
            let segment = segment_at(&self.segments, i);
            if i < last {
                if compare_components(segment, prefix_segment) != Ordering::Equal {
                    return false;
                }
                continue;
            }
            for (j, component) in prefix_segment.iter().enumerate() {
                if segment.get(j).unwrap_or(&ZERO) != component {
                    return false;
                }
            }
        }
        true
    }

    fn normalized(segments: &[Segment]) -> Vec<&[Component]> {
        let mut normalized: Vec<&[Component]> = segments
            .iter()
            .map(|segment| {
                let mut end = segment.len();
                while end > 0 && segment[end - 1] == ZERO {
                    end -= 1;
                }
                &segment[..end]
            })
            .collect();
        while normalized.last().is_some_and(|s| s.is_empty()) {
            normalized.pop();
        }
        normalized
    }
}

fn parse_segments(text: &str, source: &str) -> Result<Vec<Segment>, ParseVersionError> {
    let mut segments = Vec::new();

    for part in text.split(|c: char| c == '.' || c == '_' || c == '-') {
        if part.is_empty() {
            return Err(ParseVersionError::EmptySegment(source.to_string()));
        }
        if !part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseVersionError::InvalidCharacters(source.to_string()));
        }

        let mut segment = Vec::new();
        for token in COMPONENT_RE.find_iter(part).map(|m| m.as_str()) {
            let component = if token.as_bytes()[0].is_ascii_digit() {
                let number = token
                    .parse::<u64>()
                    .map_err(|_| ParseVersionError::NumberOutOfRange(source.to_string()))?;
                Component::Number(number)
            } else {
                match token {
                    "dev" => Component::Dev,
                    "post" => Component::Post,
                    other => Component::Iden(other.to_string()),
                }
            };
            segment.push(component);
        }

        // A segment that starts with a letter gets an implicit leading zero
        if !matches!(segment.first(), Some(Component::Number(_))) {
            segment.insert(0, Component::Number(0));
        }
        segments.push(segment);
    }

    Ok(segments)
}

fn segment_at(segments: &[Segment], index: usize) -> &[Component] {
    segments.get(index).map(Vec::as_slice).unwrap_or(&[])
}

fn compare_components(a: &[Component], b: &[Component]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let left = a.get(i).unwrap_or(&ZERO);
        let right = b.get(i).unwrap_or(&ZERO);
        match left.cmp(right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        match compare_components(segment_at(a, i), segment_at(b, i)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.segments, &other.segments))
            .then_with(|| compare_segments(&self.local, &other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        Self::normalized(&self.segments).hash(state);
        Self::normalized(&self.local).hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ParseVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_keeps_source() {
        assert_eq!(v("1.2.3").as_str(), "1.2.3");
        assert_eq!(v(" 2!1.0+local.1 ").as_str(), "2!1.0+local.1");
        assert_eq!(v("2!1.0").epoch(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Version::parse(""), Err(ParseVersionError::Empty));
        assert!(matches!(Version::parse("1..2"), Err(ParseVersionError::EmptySegment(_))));
        assert!(matches!(Version::parse("1.2$"), Err(ParseVersionError::InvalidCharacters(_))));
        assert!(matches!(Version::parse("x!1.0"), Err(ParseVersionError::InvalidEpoch(_))));
    }

    #[test]
    fn test_ordering() {
        let ordered = [
            "0.4", "0.4.1.rc", "0.4.1", "0.5a1", "0.5b3", "0.5c1", "0.5", "0.9.6", "0.960923",
            "1.0dev", "1.0a1", "1.0rc1", "1.0", "1.0post1", "1.1dev1", "1.1", "1.1.1", "2.0",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));

        use std::collections::hash_map::DefaultHasher;
        let hash = |version: &Version| {
            let mut hasher = DefaultHasher::new();
            version.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&v("1.0")), hash(&v("1.0.0")));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(v("1.0RC1"), v("1.0rc1"));
    }

    #[test]
    fn test_major_minor() {
        let version = v("3.10.4");
        assert_eq!(version.major(), Some(3));
        assert_eq!(version.minor(), Some(10));
        assert_eq!(version.segment_count(), 3);
        assert_eq!(v("3").minor(), None);
    }

    #[test]
    fn test_compatible_with() {
        let old = v("3.10.4");
        assert!(v("3.10.9").compatible_with(&old, 2));
        assert!(!v("3.11.0").compatible_with(&old, 2));
        assert!(v("3.11.0").compatible_with(&old, 1));
        assert!(!v("3.10.1").compatible_with(&old, 2));
        assert!(!v("4.0").compatible_with(&old, 1));
    }

    #[test]
    fn test_starts_with() {
        assert!(v("1.2.3").starts_with(&v("1.2")));
        assert!(v("1.2").starts_with(&v("1.2")));
        assert!(!v("1.20").starts_with(&v("1.2")));
        assert!(!v("1").starts_with(&v("1.2")));
        assert!(v("3.9.18").starts_with(&v("3.9")));
        assert!(!v("3.11.0").starts_with(&v("3.9")));
    }

    #[test]
    fn test_serde_roundtrip_is_verbatim() {
        let json = serde_json::to_string(&v("1.0.0RC1")).unwrap();
        assert_eq!(json, "\"1.0.0RC1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "1.0.0RC1");
        assert!(serde_json::from_str::<Version>("\"1..0\"").is_err());
    }
}
