// The opaque key-value collaborator.
//
// The protocol only ever touches it through `create`/`read`/`update`/
// `delete`/`iter`; `InMemoryHashTable` is a reference implementation so
// tests have something to run against, not a claim about how a production
// deployment would persist data (spec §3: opaque beyond this four-op
// contract).

use super::entry::Entry;
use crate::common::{ClusterError, Result};
use std::collections::HashMap;

pub trait HashTable {
    fn create(&mut self, key: &str, entry: Entry) -> Result<()>;
    fn read(&self, key: &str) -> Result<Entry>;
    fn update(&mut self, key: &str, entry: Entry) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
    fn iter(&self) -> Vec<(String, Entry)>;
}

#[derive(Debug, Default)]
pub struct InMemoryHashTable {
    rows: HashMap<String, Entry>,
}

impl InMemoryHashTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashTable for InMemoryHashTable {
    fn create(&mut self, key: &str, entry: Entry) -> Result<()> {
        if self.rows.contains_key(key) {
            return Err(ClusterError::AlreadyExists(key.to_string()));
        }
        self.rows.insert(key.to_string(), entry);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Entry> {
        self.rows.get(key).cloned().ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }

    fn update(&mut self, key: &str, entry: Entry) -> Result<()> {
        if !self.rows.contains_key(key) {
            return Err(ClusterError::NotFound(key.to_string()));
        }
        self.rows.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.rows.remove(key).map(|_| ()).ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }

    fn iter(&self) -> Vec<(String, Entry)> {
        self.rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ReplicaRole;

    fn entry(v: &str) -> Entry {
        Entry::new(v.to_string(), 0, ReplicaRole::Primary)
    }

    #[test]
    fn create_rejects_duplicate() {
        let mut t = InMemoryHashTable::new();
        t.create("k", entry("v")).unwrap();
        assert!(t.create("k", entry("v2")).is_err());
    }

    #[test]
    fn update_requires_existing_key() {
        let mut t = InMemoryHashTable::new();
        assert!(t.update("missing", entry("v")).is_err());
    }

    #[test]
    fn delete_removes_and_then_read_fails() {
        let mut t = InMemoryHashTable::new();
        t.create("k", entry("v")).unwrap();
        t.delete("k").unwrap();
        assert!(t.read("k").is_err());
    }

    #[test]
    fn iter_reflects_all_rows() {
        let mut t = InMemoryHashTable::new();
        t.create("a", entry("1")).unwrap();
        t.create("b", entry("2")).unwrap();
        assert_eq!(t.iter().len(), 2);
    }
}
