//! Repositories as seen by the database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a repository inside one [`Database`](crate::Database)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId(pub usize);

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repo#{}", self.0)
    }
}

/// Channel preference of a repository.
///
/// Compares `priority` first and `subpriority` second; the greater value
/// wins. A platform subdirectory usually gets subpriority 1 and `noarch` 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priorities {
    pub priority: i32,
    pub subpriority: i32,
}

impl Priorities {
    pub fn new(priority: i32, subpriority: i32) -> Self {
        Self { priority, subpriority }
    }
}

impl From<i32> for Priorities {
    fn from(priority: i32) -> Self {
        Self::new(priority, 0)
    }
}

/// A named set of records loaded into the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: RepoId,
    pub name: String,
    pub priority: Priorities,
    pub installed: bool,
    len: usize,
}

impl Repository {
    pub(crate) fn new(id: RepoId, name: impl Into<String>, priority: Priorities, installed: bool, len: usize) -> Self {
        Self {
            id,
            name: name.into(),
            priority,
            installed,
            len,
        }
    }

    /// Number of records the repository contributed
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
