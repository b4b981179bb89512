//! Snapshot persistence for the in-memory store.
//!
//! Writes the full table state as JSON, atomically: the snapshot is written
//! to a temp file in the target directory and renamed over the destination.

use super::memory::{InMemoryStore, Table};
use crate::core::{OrmError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub tables: HashMap<String, Table>,
}

impl InMemoryStore {
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let snapshot = StoreSnapshot {
            version: 1,
            tables: self.tables().clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| OrmError::Store(format!("Failed to serialize snapshot: {}", e)))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| OrmError::Store(format!("Failed to create temp snapshot file: {}", e)))?;
        tmp.write_all(&json)
            .map_err(|e| OrmError::Store(format!("Failed to write snapshot: {}", e)))?;
        tmp.persist(path)
            .map_err(|e| OrmError::Store(format!("Failed to persist snapshot: {}", e)))?;

        info!("saved store snapshot to {}", path.display());
        Ok(())
    }

    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| OrmError::Store(format!("Failed to open snapshot: {}", e)))?;
        let snapshot: StoreSnapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| OrmError::Store(format!("Failed to parse snapshot: {}", e)))?;
        let mut store = Self::new();
        store.set_tables(snapshot.tables);
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Row;
    use crate::store::{DataStore, StoreCommand};

    #[test]
    fn test_snapshot_round_trip() {
        let mut store = InMemoryStore::new();
        store
            .execute(&StoreCommand::Insert {
                table: "person".into(),
                row: Row::new().with("Surname", "Smith").with("Age", 30i64),
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        store.save_snapshot(&path).unwrap();

        let loaded = InMemoryStore::load_snapshot(&path).unwrap();
        assert_eq!(loaded.row_count("person"), 1);
        let rows: Vec<_> = loaded.table("person").unwrap().rows().collect();
        assert_eq!(rows[0].get_or_null("Surname").to_string(), "Smith");
    }

    #[test]
    fn test_load_missing_snapshot_is_store_error() {
        let err = InMemoryStore::load_snapshot("/nonexistent/store.json").unwrap_err();
        assert!(matches!(err, OrmError::Store(_)));
    }
}
