use std::collections::HashMap;

use crate::database::{PackageIndex, StoredRecord};

/// Name table for the incremental backend.
///
/// Names are interned in first-seen order; each keeps the positions of its
/// records so candidates can be produced one name at a time.
#[derive(Debug, Clone, Default)]
pub struct LazyPool {
    names: Vec<String>,
    name_ids: HashMap<String, u32>,
    providers: Vec<Vec<usize>>,
}

impl LazyPool {
    pub fn name_id(&self, name: &str) -> Option<u32> {
        self.name_ids.get(name.to_lowercase().as_str()).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Interned names, in first-seen order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PackageIndex for LazyPool {
    fn create_whatprovides(&mut self, records: &[StoredRecord]) {
        self.names.clear();
        self.name_ids.clear();
        self.providers.clear();

        for (index, record) in records.iter().enumerate() {
            let name = record.record.name.to_lowercase();
            let id = match self.name_ids.get(&name) {
                Some(&id) => id,
                None => {
                    let id = self.names.len() as u32;
                    self.names.push(name.clone());
                    self.name_ids.insert(name, id);
                    self.providers.push(Vec::new());
                    id
                }
            };
            self.providers[id as usize].push(index);
        }
    }

    fn providers(&self, name: &str) -> Option<&[usize]> {
        let id = self.name_id(name)?;
        self.providers.get(id as usize).map(Vec::as_slice)
    }
}
