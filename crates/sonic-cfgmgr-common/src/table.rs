//! In-memory table model for APPL_DB and STATE_DB writes.
//!
//! Managers receive a [`DbTables`] handle per database instead of a live
//! Redis connection. Writes are idempotent upserts or deletes and the last
//! known value per key is authoritative, matching the contract downstream
//! hardware-programming consumers rely on. Tests read the same handle back
//! to verify converged state, so production and test code share one path.

use std::collections::BTreeMap;

use crate::manager::{FieldValues, FieldValuesExt};

/// One named table: key -> field-value set.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: BTreeMap<String, FieldValues>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the given fields into the entry, creating it if absent.
    ///
    /// Fields not named in `fvs` are left untouched (hash-set semantics).
    pub fn set(&mut self, key: &str, fvs: FieldValues) {
        let entry = self.entries.entry(key.to_string()).or_default();
        for (field, value) in fvs {
            if let Some(existing) = entry.iter_mut().find(|(f, _)| *f == field) {
                existing.1 = value;
            } else {
                entry.push((field, value));
            }
        }
    }

    /// Replaces the entry wholesale.
    pub fn replace(&mut self, key: &str, fvs: FieldValues) {
        self.entries.insert(key.to_string(), fvs);
    }

    /// Deletes the entry. Deleting a missing key is a no-op.
    pub fn del(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Returns the entry for a key, if present.
    pub fn get(&self, key: &str) -> Option<&FieldValues> {
        self.entries.get(key)
    }

    /// Returns one field of one entry, if present.
    pub fn hget(&self, key: &str, field: &str) -> Option<&str> {
        self.entries.get(key).and_then(|fvs| fvs.get_field(field))
    }

    /// Returns true if the key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A set of named tables modeling one database (APPL_DB or STATE_DB).
#[derive(Debug, Clone, Default)]
pub struct DbTables {
    tables: BTreeMap<String, Table>,
}

impl DbTables {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts fields into `table:key`.
    pub fn set(&mut self, table: &str, key: &str, fvs: FieldValues) {
        self.tables.entry(table.to_string()).or_default().set(key, fvs);
    }

    /// Replaces the `table:key` entry wholesale.
    pub fn replace(&mut self, table: &str, key: &str, fvs: FieldValues) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .replace(key, fvs);
    }

    /// Deletes `table:key`.
    pub fn del(&mut self, table: &str, key: &str) {
        if let Some(t) = self.tables.get_mut(table) {
            t.del(key);
        }
    }

    /// Returns the named table, if it has ever been written.
    pub fn table(&self, table: &str) -> Option<&Table> {
        self.tables.get(table)
    }

    /// Returns the entry at `table:key`, if present.
    pub fn get(&self, table: &str, key: &str) -> Option<&FieldValues> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    /// Returns one field at `table:key`, if present.
    pub fn hget(&self, table: &str, key: &str, field: &str) -> Option<&str> {
        self.tables.get(table).and_then(|t| t.hget(key, field))
    }

    /// Returns true if `table:key` exists.
    pub fn contains(&self, table: &str, key: &str) -> bool {
        self.tables
            .get(table)
            .map(|t| t.contains_key(key))
            .unwrap_or(false)
    }

    /// Total entry count across all tables.
    pub fn total_entries(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_set_merges_fields() {
        let mut table = Table::new();
        table.set(
            "Ethernet0",
            vec![("speed".to_string(), "100000".to_string())],
        );
        table.set("Ethernet0", vec![("mtu".to_string(), "9100".to_string())]);
        table.set(
            "Ethernet0",
            vec![("speed".to_string(), "40000".to_string())],
        );

        assert_eq!(table.hget("Ethernet0", "speed"), Some("40000"));
        assert_eq!(table.hget("Ethernet0", "mtu"), Some("9100"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_replace_drops_old_fields() {
        let mut table = Table::new();
        table.set("p1", vec![("a".to_string(), "1".to_string())]);
        table.replace("p1", vec![("b".to_string(), "2".to_string())]);

        assert_eq!(table.hget("p1", "a"), None);
        assert_eq!(table.hget("p1", "b"), Some("2"));
    }

    #[test]
    fn test_table_del_idempotent() {
        let mut table = Table::new();
        table.set("p1", vec![]);
        table.del("p1");
        table.del("p1");
        assert!(table.is_empty());
    }

    #[test]
    fn test_db_tables() {
        let mut db = DbTables::new();
        db.set(
            "BUFFER_POOL_TABLE",
            "ingress_lossless_pool",
            vec![("size".to_string(), "1024".to_string())],
        );

        assert!(db.contains("BUFFER_POOL_TABLE", "ingress_lossless_pool"));
        assert_eq!(
            db.hget("BUFFER_POOL_TABLE", "ingress_lossless_pool", "size"),
            Some("1024")
        );
        assert_eq!(db.total_entries(), 1);

        db.del("BUFFER_POOL_TABLE", "ingress_lossless_pool");
        assert!(!db.contains("BUFFER_POOL_TABLE", "ingress_lossless_pool"));
    }
}
