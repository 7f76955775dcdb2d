//! Append-only log of applied transactions.
//!
//! Each entry is one JSON object per line. The in-memory form is an arena of
//! entries plus a cursor naming the revision the environment matches.
//! Revision 0 is the empty environment; entry ids start at 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{CondorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    Transaction,
    /// Restored the environment of revision `of`
    Rollback { of: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    #[serde(default)]
    pub requested: Vec<String>,
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub unlink: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    path: Option<PathBuf>,
    entries: Vec<HistoryEntry>,
    cursor: u64,
}

impl History {
    /// A history that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the log at `path`; a missing file is an empty history.
    ///
    /// Later writes append to the same file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();

        if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: HistoryEntry = serde_json::from_str(&line).map_err(|e| {
                    CondorError::History(format!("{}:{}: {}", path.display(), number + 1, e))
                })?;
                entries.push(entry);
            }
        }

        let mut history = Self {
            path: Some(path),
            entries,
            cursor: 0,
        };
        history.cursor = history.replay_cursor();
        log::debug!("Loaded {} history entries", history.entries.len());
        Ok(history)
    }

    fn replay_cursor(&self) -> u64 {
        match self.entries.last() {
            Some(HistoryEntry {
                kind: EntryKind::Rollback { of },
                ..
            }) => *of,
            Some(entry) => entry.id,
            None => 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The revision the environment currently matches
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_id(&self) -> u64 {
        self.entries.last().map_or(1, |e| e.id + 1)
    }

    /// Append a transaction entry and return its id
    pub fn record(&mut self, requested: Vec<String>, link: Vec<String>, unlink: Vec<String>) -> Result<u64> {
        let entry = HistoryEntry {
            id: self.next_id(),
            timestamp: Utc::now(),
            kind: EntryKind::Transaction,
            requested,
            link,
            unlink,
        };
        let id = entry.id;
        self.append(entry)?;
        self.cursor = id;
        Ok(id)
    }

    /// Distributions present after replaying every entry up to `revision`
    pub fn state_at(&self, revision: u64) -> BTreeSet<String> {
        let mut state = BTreeSet::new();
        for entry in self.entries.iter().take_while(|e| e.id <= revision) {
            for dist in &entry.unlink {
                state.remove(dist);
            }
            state.extend(entry.link.iter().cloned());
        }
        state
    }

    /// Distributions present now
    pub fn current_state(&self) -> BTreeSet<String> {
        self.state_at(u64::MAX)
    }

    /// Return the environment to what it was at `revision`.
    ///
    /// Appends an entry whose link and unlink lists reverse every change
    /// made since, and moves the cursor to `revision`.
    pub fn rollback(&mut self, revision: u64) -> Result<&HistoryEntry> {
        if revision > 0 && self.get(revision).is_none() {
            return Err(CondorError::History(format!("no revision {} to roll back to", revision)));
        }

        let current = self.current_state();
        let target = self.state_at(revision);

        let entry = HistoryEntry {
            id: self.next_id(),
            timestamp: Utc::now(),
            kind: EntryKind::Rollback { of: revision },
            requested: Vec::new(),
            link: target.difference(&current).cloned().collect(),
            unlink: current.difference(&target).cloned().collect(),
        };

        log::info!(
            "Rolling back to revision {}: {} to link, {} to unlink",
            revision,
            entry.link.len(),
            entry.unlink.len()
        );

        self.append(entry)?;
        self.cursor = revision;
        self.entries
            .last()
            .ok_or_else(|| CondorError::History("history is empty after append".to_string()))
    }

    fn append(&mut self, entry: HistoryEntry) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        }
        self.entries.push(entry);
        Ok(())
    }
}
