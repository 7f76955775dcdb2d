//! Version range expressions.
//!
//! `,` joins terms with AND, `|` joins alternatives with OR (binding looser
//! than `,`). A term is an optional operator followed by a version, where a
//! trailing `*` or `.*` turns equality into a prefix match:
//!
//! | text        | meaning                       |
//! |-------------|-------------------------------|
//! | `1.2`       | exactly 1.2                   |
//! | `==1.2`     | exactly 1.2                   |
//! | `=1.2`      | 1.2 or anything starting 1.2. |
//! | `1.2.*`     | same as `=1.2`                |
//! | `!=1.2.*`   | not starting with 1.2         |
//! | `>=1,<2`    | range                         |
//! | `~=1.2`     | `>=1.2` and starting with 1.  |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::operator::Operator;
use crate::version::{ParseVersionError, Version};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseVersionSpecError {
    #[error("empty version spec")]
    Empty,

    #[error("malformed version spec '{0}'")]
    Malformed(String),

    #[error(transparent)]
    InvalidVersion(#[from] ParseVersionError),
}

/// A version range expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    /// Matches every version
    Any,
    /// A single operator applied to a version
    Constraint(Operator, Version),
    /// All terms must match
    And(Vec<VersionSpec>),
    /// At least one alternative must match
    Or(Vec<VersionSpec>),
}

impl VersionSpec {
    pub fn parse(input: &str) -> Result<Self, ParseVersionSpecError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ParseVersionSpecError::Empty);
        }

        let mut alternatives = Vec::new();
        for alternative in text.split('|') {
            let mut terms = Vec::new();
            for term in alternative.split(',') {
                let term = term.trim();
                if term.is_empty() {
                    return Err(ParseVersionSpecError::Malformed(text.to_string()));
                }
                terms.push(Self::parse_term(term, text)?);
            }
            alternatives.push(collapse(terms, VersionSpec::And));
        }

        Ok(collapse(alternatives, VersionSpec::Or))
    }

    fn parse_term(term: &str, whole: &str) -> Result<Self, ParseVersionSpecError> {
        if term == "*" {
            return Ok(VersionSpec::Any);
        }

        let (operator, rest) = match Operator::split_prefix(term) {
            Some((op, rest)) => (Some(op), rest.trim()),
            None => (None, term),
        };

        let (glob, version_text) = match rest.strip_suffix(".*").or_else(|| rest.strip_suffix('*')) {
            Some(prefix) => (true, prefix),
            None => (false, rest),
        };

        if version_text.is_empty() {
            return if glob {
                Ok(VersionSpec::Any)
            } else {
                Err(ParseVersionSpecError::Malformed(whole.to_string()))
            };
        }

        let version = Version::parse(version_text)?;
        let operator = match (operator, glob) {
            (None, false) | (Some(Operator::Equal), false) => Operator::Equal,
            (None, true) | (Some(Operator::Equal), true) | (Some(Operator::StartsWith), _) => {
                Operator::StartsWith
            }
            (Some(Operator::NotEqual), true) => Operator::NotStartsWith,
            (Some(op), _) => op,
        };

        Ok(VersionSpec::Constraint(operator, version))
    }

    /// Evaluate the expression against a version
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Constraint(op, bound) => match op {
                Operator::StartsWith => version.starts_with(bound),
                Operator::NotStartsWith => !version.starts_with(bound),
                Operator::Compatible => {
                    let depth = bound.segment_count().saturating_sub(1).max(1);
                    version >= bound && version.segments_equal(bound, depth)
                }
                other => other.compare(version, bound),
            },
            VersionSpec::And(terms) => terms.iter().all(|t| t.matches(version)),
            VersionSpec::Or(alternatives) => alternatives.iter().any(|a| a.matches(version)),
        }
    }

    /// Whether this spec accepts every version
    pub fn is_any(&self) -> bool {
        matches!(self, VersionSpec::Any)
    }
}

fn collapse(mut items: Vec<VersionSpec>, wrap: fn(Vec<VersionSpec>) -> VersionSpec) -> VersionSpec {
    if items.len() == 1 {
        items.pop().unwrap_or(VersionSpec::Any)
    } else {
        wrap(items)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => f.write_str("*"),
            VersionSpec::Constraint(op, version) => match op {
                Operator::StartsWith => write!(f, "{}.*", version),
                Operator::NotStartsWith => write!(f, "!={}.*", version),
                other => write!(f, "{}{}", other, version),
            },
            VersionSpec::And(terms) => write_joined(f, terms, ","),
            VersionSpec::Or(alternatives) => write_joined(f, alternatives, "|"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[VersionSpec], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl FromStr for VersionSpec {
    type Err = ParseVersionSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
