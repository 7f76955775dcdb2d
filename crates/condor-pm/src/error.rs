use condor_spec::{ParseMatchSpecError, ParseVersionError};
use thiserror::Error;

use crate::acquisition::AcquisitionError;
use crate::solver::{SolverKind, Unsolvable};

/// Failure to read a spec, version or record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    MatchSpec(#[from] ParseMatchSpecError),

    #[error(transparent)]
    Version(#[from] ParseVersionError),

    #[error("Invalid record {record}: {source}")]
    Record {
        record: String,
        #[source]
        source: ParseMatchSpecError,
    },
}

#[derive(Error, Debug)]
pub enum CondorError {
    // Input errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // Solver errors
    #[error("{0}")]
    Unsolvable(Box<Unsolvable>),

    #[error("Database was built for the {found} solver, but the {expected} solver was requested")]
    BackendMismatch { expected: SolverKind, found: SolverKind },

    // Transaction errors
    #[error("Path {path} would be written by both {first} and {second}")]
    ConflictingPath {
        path: String,
        first: String,
        second: String,
    },

    #[error("{name} is pinned to {pinned} but {requested} was requested")]
    PinViolation {
        name: String,
        pinned: String,
        requested: String,
    },

    // Repository acquisition errors
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    // History errors
    #[error("History error: {0}")]
    History(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ParseMatchSpecError> for CondorError {
    fn from(err: ParseMatchSpecError) -> Self {
        CondorError::Parse(ParseError::MatchSpec(err))
    }
}

impl From<ParseVersionError> for CondorError {
    fn from(err: ParseVersionError) -> Self {
        CondorError::Parse(ParseError::Version(err))
    }
}

impl From<Unsolvable> for CondorError {
    fn from(err: Unsolvable) -> Self {
        CondorError::Unsolvable(Box::new(err))
    }
}

impl CondorError {
    /// Whether repeating the operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CondorError::Acquisition(err) => err.is_transient(),
            CondorError::Io(_) => true,
            _ => false,
        }
    }

    /// The unsolvable verdict, if this is one
    pub fn as_unsolvable(&self) -> Option<&Unsolvable> {
        match self {
            CondorError::Unsolvable(unsolvable) => Some(unsolvable),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CondorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use condor_spec::MatchSpec;

    #[test]
    fn test_parse_errors_convert() {
        let err: CondorError = MatchSpec::parse("foo[").unwrap_err().into();
        assert!(matches!(err, CondorError::Parse(ParseError::MatchSpec(_))));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_backend_mismatch_message() {
        let err = CondorError::BackendMismatch {
            expected: SolverKind::Lazy,
            found: SolverKind::Sat,
        };
        assert_eq!(
            err.to_string(),
            "Database was built for the sat solver, but the lazy solver was requested"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pin_violation_message() {
        let err = CondorError::PinViolation {
            name: "python".to_string(),
            pinned: "python 3.9.*".to_string(),
            requested: "python 3.11.*".to_string(),
        };
        assert!(err.to_string().contains("pinned to python 3.9.*"));
    }
}
