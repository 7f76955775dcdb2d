//! Operator types for version constraints

use std::fmt;
use thiserror::Error;

/// Comparison operators for version and build number constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal (==)
    Equal,
    /// Not equal (!=)
    NotEqual,
    /// Less than (<)
    Less,
    /// Less than or equal (<=)
    LessEqual,
    /// Greater than (>)
    Greater,
    /// Greater than or equal (>=)
    GreaterEqual,
    /// Prefix match (`=1.2`, `1.2.*`)
    StartsWith,
    /// Negated prefix match (`!=1.2.*`)
    NotStartsWith,
    /// Compatible release (~=)
    Compatible,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid operator: {0}")]
pub struct InvalidOperatorError(pub String);

impl Operator {
    /// Operator prefixes in the order they must be tried
    pub const PREFIXES: [&'static str; 8] = ["==", "!=", ">=", "<=", "~=", ">", "<", "="];

    /// Parse operator from string
    pub fn from_str(s: &str) -> Result<Self, InvalidOperatorError> {
        match s {
            "==" => Ok(Operator::Equal),
            "!=" => Ok(Operator::NotEqual),
            "<" => Ok(Operator::Less),
            "<=" => Ok(Operator::LessEqual),
            ">" => Ok(Operator::Greater),
            ">=" => Ok(Operator::GreaterEqual),
            "=" => Ok(Operator::StartsWith),
            "~=" => Ok(Operator::Compatible),
            _ => Err(InvalidOperatorError(s.to_string())),
        }
    }

    /// Split a leading operator off `text`
    pub fn split_prefix(text: &str) -> Option<(Operator, &str)> {
        Self::PREFIXES.iter().find_map(|prefix| {
            text.strip_prefix(prefix)
                .and_then(|rest| Self::from_str(prefix).ok().map(|op| (op, rest)))
        })
    }

    /// Get the string representation of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::StartsWith => "=",
            Operator::NotStartsWith => "!=",
            Operator::Compatible => "~=",
        }
    }

    /// Evaluate an ordering-based operator on two comparable values.
    ///
    /// Prefix operators fall back to equality here; version specs handle
    /// them before reaching this point.
    pub fn compare<T: Ord>(&self, value: &T, bound: &T) -> bool {
        match self {
            Operator::Equal | Operator::StartsWith | Operator::Compatible => value == bound,
            Operator::NotEqual | Operator::NotStartsWith => value != bound,
            Operator::Less => value < bound,
            Operator::LessEqual => value <= bound,
            Operator::Greater => value > bound,
            Operator::GreaterEqual => value >= bound,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_from_str() {
        assert_eq!(Operator::from_str("==").unwrap(), Operator::Equal);
        assert_eq!(Operator::from_str("=").unwrap(), Operator::StartsWith);
        assert_eq!(Operator::from_str(">=").unwrap(), Operator::GreaterEqual);
        assert_eq!(Operator::from_str("~=").unwrap(), Operator::Compatible);
        assert!(Operator::from_str("<>").is_err());
    }

    #[test]
    fn test_split_prefix_prefers_longest() {
        assert_eq!(Operator::split_prefix(">=1.0"), Some((Operator::GreaterEqual, "1.0")));
        assert_eq!(Operator::split_prefix("==1.0"), Some((Operator::Equal, "1.0")));
        assert_eq!(Operator::split_prefix("=1.0"), Some((Operator::StartsWith, "1.0")));
        assert_eq!(Operator::split_prefix("<2"), Some((Operator::Less, "2")));
        assert_eq!(Operator::split_prefix("1.0"), None);
    }

    #[test]
    fn test_compare() {
        assert!(Operator::Less.compare(&1, &2));
        assert!(Operator::GreaterEqual.compare(&2, &2));
        assert!(!Operator::NotEqual.compare(&2, &2));
    }
}
