//! Match specifications: textual package queries evaluated against records.
//!
//! Accepted forms:
//!
//! ```text
//! numpy
//! numpy 1.8*
//! numpy >=1.8,<2 py39*
//! numpy>=1.8
//! numpy=1.8=py39_0
//! conda-forge::numpy
//! conda-forge/linux-64::numpy[version='>=1.8', build_number='>=2']
//! ```

use glob::{MatchOptions, Pattern};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::operator::Operator;
use crate::package_info::PackageInfo;
use crate::version_spec::{ParseVersionSpecError, VersionSpec};

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[a-z0-9_.\-*]+$").unwrap();
    static ref SUBDIR_RE: Regex =
        Regex::new(r"^(noarch|(linux|osx|win|zos|freebsd|emscripten|wasi)-[a-z0-9_]+)$").unwrap();
    static ref SEPARATOR_SPACE_RE: Regex = Regex::new(r"\s*([,|])\s*").unwrap();
    static ref OPERATOR_SPACE_RE: Regex = Regex::new(r"(==|!=|>=|<=|~=|[=<>])\s+").unwrap();
}

const IGNORE_CASE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMatchSpecError {
    #[error("empty match spec")]
    Empty,

    #[error("invalid package name '{0}'")]
    InvalidName(String),

    #[error("invalid version in '{spec}': {source}")]
    InvalidVersion {
        spec: String,
        source: ParseVersionSpecError,
    },

    #[error("invalid glob pattern '{0}'")]
    InvalidPattern(String),

    #[error("invalid build number '{0}'")]
    InvalidBuildNumber(String),

    #[error("unbalanced brackets in '{0}'")]
    UnbalancedBrackets(String),

    #[error("invalid bracket entry '{0}'")]
    InvalidBracket(String),

    #[error("unknown bracket key '{0}'")]
    UnknownKey(String),

    #[error("too many fields in '{0}'")]
    TooManyFields(String),
}

/// Exact or glob string comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StringMatcher {
    Exact(String),
    Glob(Pattern),
}

impl StringMatcher {
    pub fn parse(text: &str) -> Result<Self, ParseMatchSpecError> {
        if text.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            Pattern::new(text)
                .map(StringMatcher::Glob)
                .map_err(|_| ParseMatchSpecError::InvalidPattern(text.to_string()))
        } else {
            Ok(StringMatcher::Exact(text.to_string()))
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            StringMatcher::Exact(expected) => expected == value,
            StringMatcher::Glob(pattern) => pattern.matches(value),
        }
    }

    fn matches_ignore_case(&self, value: &str) -> bool {
        match self {
            StringMatcher::Exact(expected) => expected.eq_ignore_ascii_case(value),
            StringMatcher::Glob(pattern) => pattern.matches_with(value, IGNORE_CASE),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StringMatcher::Exact(value) => value,
            StringMatcher::Glob(pattern) => pattern.as_str(),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, StringMatcher::Exact(_))
    }
}

/// Build number constraint (`build_number='>=3'`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildNumberSpec {
    pub operator: Operator,
    pub value: u64,
}

impl BuildNumberSpec {
    pub fn parse(text: &str) -> Result<Self, ParseMatchSpecError> {
        let text = text.trim();
        let (operator, rest) = match Operator::split_prefix(text) {
            Some((Operator::StartsWith, rest)) => (Operator::Equal, rest),
            Some((Operator::Compatible, _)) => {
                return Err(ParseMatchSpecError::InvalidBuildNumber(text.to_string()))
            }
            Some((op, rest)) => (op, rest),
            None => (Operator::Equal, text),
        };
        let value = rest
            .trim()
            .parse()
            .map_err(|_| ParseMatchSpecError::InvalidBuildNumber(text.to_string()))?;
        Ok(Self { operator, value })
    }

    pub fn matches(&self, build_number: u64) -> bool {
        self.operator.compare(&build_number, &self.value)
    }
}

impl fmt::Display for BuildNumberSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.value)
    }
}

/// An immutable package query.
///
/// Omitted fields act as wildcards. Matching never fails: a field that does
/// not apply to a record makes the match false.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatchSpec {
    pub name: StringMatcher,
    pub version: Option<VersionSpec>,
    pub build: Option<StringMatcher>,
    pub build_number: Option<BuildNumberSpec>,
    pub channel: Option<String>,
    pub subdir: Option<String>,
    pub md5: Option<String>,
    pub sha256: Option<String>,
    pub file_name: Option<String>,
}

impl MatchSpec {
    /// Parse a match spec string
    pub fn parse(input: &str) -> Result<Self, ParseMatchSpecError> {
        let mut text = input.trim();
        if text.is_empty() {
            return Err(ParseMatchSpecError::Empty);
        }

        let mut brackets = Vec::new();
        if let Some(open) = text.find('[') {
            let inner = text[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| ParseMatchSpecError::UnbalancedBrackets(input.to_string()))?;
            brackets = parse_brackets(inner, input)?;
            text = text[..open].trim_end();
        }

        let (channel, subdir, text) = match text.split_once("::") {
            Some((channel, rest)) => {
                let (channel, subdir) = split_channel(channel);
                (Some(channel), subdir, rest.trim())
            }
            None => (None, None, text),
        };

        let (name, version, build) = split_fields(text, input)?;

        let mut spec = MatchSpec {
            name: parse_name(&name)?,
            version: version.map(|v| parse_version(&v, input)).transpose()?,
            build: build.map(|b| StringMatcher::parse(&b)).transpose()?,
            build_number: None,
            channel,
            subdir,
            md5: None,
            sha256: None,
            file_name: None,
        };

        for (key, value) in brackets {
            spec.apply_bracket(&key, &value, input)?;
        }

        Ok(spec)
    }

    /// A spec matching any record with the given name
    pub fn from_name(name: &str) -> Result<Self, ParseMatchSpecError> {
        Ok(MatchSpec {
            name: parse_name(name)?,
            version: None,
            build: None,
            build_number: None,
            channel: None,
            subdir: None,
            md5: None,
            sha256: None,
            file_name: None,
        })
    }

    fn apply_bracket(&mut self, key: &str, value: &str, input: &str) -> Result<(), ParseMatchSpecError> {
        match key {
            "version" => self.version = Some(parse_version(value, input)?),
            "build" => self.build = Some(StringMatcher::parse(value)?),
            "build_number" => self.build_number = Some(BuildNumberSpec::parse(value)?),
            "channel" => {
                let (channel, subdir) = split_channel(value);
                self.channel = Some(channel);
                if subdir.is_some() {
                    self.subdir = subdir;
                }
            }
            "subdir" => self.subdir = Some(value.to_string()),
            "md5" => self.md5 = Some(value.to_lowercase()),
            "sha256" => self.sha256 = Some(value.to_lowercase()),
            "fn" => self.file_name = Some(value.to_string()),
            other => return Err(ParseMatchSpecError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// The package name when it is not a pattern
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            StringMatcher::Exact(name) => Some(name.as_str()),
            StringMatcher::Glob(_) => None,
        }
    }

    /// True when only the name constrains this spec
    pub fn is_name_only(&self) -> bool {
        self.version.as_ref().map_or(true, VersionSpec::is_any)
            && self.build.is_none()
            && self.build_number.is_none()
            && self.channel.is_none()
            && self.subdir.is_none()
            && self.md5.is_none()
            && self.sha256.is_none()
            && self.file_name.is_none()
    }

    /// Evaluate this spec against a record
    pub fn matches(&self, record: &PackageInfo) -> bool {
        if !self.name.matches_ignore_case(&record.name) {
            return false;
        }
        if let Some(version) = &self.version {
            if !version.matches(&record.version) {
                return false;
            }
        }
        if let Some(build) = &self.build {
            if !build.matches(&record.build_string) {
                return false;
            }
        }
        if let Some(build_number) = &self.build_number {
            if !build_number.matches(record.build_number) {
                return false;
            }
        }
        if let Some(channel) = &self.channel {
            if !channel_matches(channel, &record.channel) {
                return false;
            }
        }
        if let Some(subdir) = &self.subdir {
            if !subdir.eq_ignore_ascii_case(&record.subdir) {
                return false;
            }
        }
        if let Some(md5) = &self.md5 {
            if !record.md5.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(md5)) {
                return false;
            }
        }
        if let Some(sha256) = &self.sha256 {
            if !record.sha256.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(sha256)) {
                return false;
            }
        }
        if let Some(file_name) = &self.file_name {
            if file_name != &record.file_name {
                return false;
            }
        }
        true
    }
}

fn parse_name(name: &str) -> Result<StringMatcher, ParseMatchSpecError> {
    let name = name.trim().to_lowercase();
    if !NAME_RE.is_match(&name) {
        return Err(ParseMatchSpecError::InvalidName(name));
    }
    StringMatcher::parse(&name)
}

fn parse_version(text: &str, input: &str) -> Result<VersionSpec, ParseMatchSpecError> {
    VersionSpec::parse(text).map_err(|source| ParseMatchSpecError::InvalidVersion {
        spec: input.to_string(),
        source,
    })
}

/// Split `conda-forge/linux-64` into channel and subdir
fn split_channel(channel: &str) -> (String, Option<String>) {
    let trimmed = channel.trim().trim_end_matches('/');
    if let Some((base, last)) = trimmed.rsplit_once('/') {
        if SUBDIR_RE.is_match(last) {
            return (base.to_string(), Some(last.to_string()));
        }
    }
    (trimmed.to_string(), None)
}

/// Channels compare case-insensitively; a channel name also matches a
/// channel URL ending in that name.
fn channel_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim_end_matches('/').to_lowercase();
    let actual = actual.trim_end_matches('/').to_lowercase();
    expected == actual
        || actual.ends_with(&format!("/{}", expected))
        || expected.ends_with(&format!("/{}", actual))
}

type Fields = (String, Option<String>, Option<String>);

fn split_fields(text: &str, input: &str) -> Result<Fields, ParseMatchSpecError> {
    let normalized = SEPARATOR_SPACE_RE.replace_all(text, "$1");
    let normalized = OPERATOR_SPACE_RE.replace_all(&normalized, "$1");
    let fields: Vec<&str> = normalized.split_whitespace().collect();

    let Some((first, rest)) = fields.split_first() else {
        return Err(ParseMatchSpecError::Empty);
    };

    let (name, mut version, mut build) = split_compact(first);
    match rest {
        [] => {}
        [single] if version.is_none() => version = Some(single.to_string()),
        [single] if build.is_none() => build = Some(single.to_string()),
        [v, b] if version.is_none() => {
            version = Some(v.to_string());
            build = Some(b.to_string());
        }
        _ => return Err(ParseMatchSpecError::TooManyFields(input.to_string())),
    }

    Ok((name, version, build))
}

/// Split `name>=1.0` or `name=1.0=build` into its parts
fn split_compact(field: &str) -> Fields {
    let Some(index) = field.find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~')) else {
        return (field.to_string(), None, None);
    };

    let (name, rest) = field.split_at(index);
    if let Some(after) = rest.strip_prefix('=').filter(|r| !r.starts_with('=')) {
        if let Some((version, build)) = after.split_once('=') {
            return (name.to_string(), Some(version.to_string()), Some(build.to_string()));
        }
    }
    (name.to_string(), Some(rest.to_string()), None)
}

fn parse_brackets(inner: &str, input: &str) -> Result<Vec<(String, String)>, ParseMatchSpecError> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in inner.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
        } else if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == ',' {
            entries.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if quote.is_some() {
        return Err(ParseMatchSpecError::UnbalancedBrackets(input.to_string()));
    }
    entries.push(current);

    entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ParseMatchSpecError::InvalidBracket(entry.trim().to_string()))?;
            Ok((key.trim().to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            f.write_str(channel)?;
            if let Some(subdir) = &self.subdir {
                write!(f, "/{}", subdir)?;
            }
            f.write_str("::")?;
        }
        f.write_str(self.name.as_str())?;

        match (&self.version, &self.build) {
            (Some(version), Some(build)) => write!(f, " {} {}", version, build.as_str())?,
            (Some(version), None) => write!(f, " {}", version)?,
            (None, Some(build)) => write!(f, " * {}", build.as_str())?,
            (None, None) => {}
        }

        let mut extras = Vec::new();
        if self.channel.is_none() {
            if let Some(subdir) = &self.subdir {
                extras.push(format!("subdir={}", subdir));
            }
        }
        if let Some(build_number) = &self.build_number {
            extras.push(format!("build_number='{}'", build_number));
        }
        if let Some(md5) = &self.md5 {
            extras.push(format!("md5={}", md5));
        }
        if let Some(sha256) = &self.sha256 {
            extras.push(format!("sha256={}", sha256));
        }
        if let Some(file_name) = &self.file_name {
            extras.push(format!("fn='{}'", file_name));
        }
        if !extras.is_empty() {
            write!(f, "[{}]", extras.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for MatchSpec {
    type Err = ParseMatchSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MatchSpec {
    type Error = ParseMatchSpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MatchSpec> for String {
    fn from(spec: MatchSpec) -> Self {
        spec.to_string()
    }
}
