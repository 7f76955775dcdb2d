use std::collections::HashMap;

use crate::database::{PackageIndex, StoredRecord};

/// Solvable id of a record: its database position plus one, so that the
/// sign of a literal can carry install/don't-install
pub type PackageId = i32;

/// The SAT view of a database: a name index over records numbered from 1
#[derive(Debug, Clone, Default)]
pub struct SatPool {
    whatprovides: HashMap<String, Vec<usize>>,
}

impl SatPool {
    pub fn package_id(index: usize) -> PackageId {
        index as PackageId + 1
    }

    /// Database position of the record behind a package id or literal
    pub fn record_index(id: PackageId) -> usize {
        id.unsigned_abs() as usize - 1
    }

    /// Number of indexed names
    pub fn name_count(&self) -> usize {
        self.whatprovides.len()
    }
}

impl PackageIndex for SatPool {
    fn create_whatprovides(&mut self, records: &[StoredRecord]) {
        self.whatprovides.clear();
        for (index, record) in records.iter().enumerate() {
            self.whatprovides
                .entry(record.record.name.to_lowercase())
                .or_default()
                .push(index);
        }
    }

    fn providers(&self, name: &str) -> Option<&[usize]> {
        self.whatprovides
            .get(name.to_lowercase().as_str())
            .map(Vec::as_slice)
    }
}
