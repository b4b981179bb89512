use super::{DataStore, SelectQuery, StoreCommand};
use crate::core::{OrmError, Result, Row};
use chrono::{Duration, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    rows: BTreeMap<u64, Row>,
    next_row_id: u64,
}

impl Table {
    pub fn insert(&mut self, row: Row) -> u64 {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        id
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
struct LockEntry {
    holder: String,
    locked_at: NaiveDateTime,
    expiry: Duration,
}

/// In-memory row store with a single-level, all-or-nothing transaction.
///
/// Beginning a transaction snapshots the table state; rollback restores the
/// snapshot, commit discards it. Statements inside the transaction act on
/// the live tables, so selects issued mid-transaction see staged writes.
/// Advisory locks live outside the transaction boundary: they are released
/// explicitly by their holder, or seized once expired.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: HashMap<String, Table>,
    locks: HashMap<String, LockEntry>,
    tx_backup: Option<HashMap<String, Table>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, Table::row_count)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub(crate) fn tables(&self) -> &HashMap<String, Table> {
        &self.tables
    }

    pub(crate) fn set_tables(&mut self, tables: HashMap<String, Table>) {
        self.tables = tables;
    }

    /// Lock acquisition against an explicit clock, so expiry behavior is
    /// testable without sleeping.
    pub fn acquire_lock_at(
        &mut self,
        resource: &str,
        holder: &str,
        expiry: Duration,
        now: NaiveDateTime,
    ) -> Result<()> {
        if let Some(existing) = self.locks.get(resource) {
            let expired = now - existing.locked_at > existing.expiry;
            if existing.holder != holder && !expired {
                return Err(OrmError::LockHeld {
                    resource: resource.to_string(),
                    holder: existing.holder.clone(),
                });
            }
            if expired {
                debug!("seizing stale lock on '{}' from '{}'", resource, existing.holder);
            }
        }
        self.locks.insert(
            resource.to_string(),
            LockEntry {
                holder: holder.to_string(),
                locked_at: now,
                expiry,
            },
        );
        Ok(())
    }
}

impl DataStore for InMemoryStore {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let Some(table) = self.tables.get(&query.table) else {
            // A table nothing has been written to is simply empty.
            return Ok(Vec::new());
        };
        let mut results = Vec::new();
        for row in table.rows() {
            let matched = match &query.criteria {
                Some(criteria) => criteria.matches_row(row)?,
                None => true,
            };
            if matched {
                results.push(row.clone());
            }
        }
        if let Some(order) = &query.order {
            order.sort_rows(&mut results);
        }
        Ok(results)
    }

    fn execute(&mut self, command: &StoreCommand) -> Result<usize> {
        match command {
            StoreCommand::Insert { table, row } => {
                self.tables.entry(table.clone()).or_default().insert(row.clone());
                Ok(1)
            }
            StoreCommand::Update {
                table,
                criteria,
                values,
            } => {
                let Some(table) = self.tables.get_mut(table) else {
                    return Ok(0);
                };
                let mut affected = 0;
                for row in table.rows.values_mut() {
                    if criteria.matches_row(row)? {
                        row.merge(values);
                        affected += 1;
                    }
                }
                Ok(affected)
            }
            StoreCommand::Delete { table, criteria } => {
                let Some(table) = self.tables.get_mut(table) else {
                    return Ok(0);
                };
                let mut doomed = Vec::new();
                for (id, row) in &table.rows {
                    if criteria.matches_row(row)? {
                        doomed.push(*id);
                    }
                }
                for id in &doomed {
                    table.rows.remove(id);
                }
                Ok(doomed.len())
            }
        }
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.tx_backup.is_some() {
            return Err(OrmError::Store("A transaction is already in progress".into()));
        }
        self.tx_backup = Some(self.tables.clone());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        if self.tx_backup.take().is_none() {
            return Err(OrmError::Store("No transaction in progress".into()));
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        match self.tx_backup.take() {
            Some(backup) => {
                self.tables = backup;
                Ok(())
            }
            None => Err(OrmError::Store("No transaction in progress".into())),
        }
    }

    fn acquire_lock(&mut self, resource: &str, holder: &str, expiry: Duration) -> Result<()> {
        self.acquire_lock_at(resource, holder, expiry, Utc::now().naive_utc())
    }

    fn release_lock(&mut self, resource: &str, holder: &str) -> Result<()> {
        if let Some(existing) = self.locks.get(resource)
            && existing.holder == holder
        {
            self.locks.remove(resource);
        }
        Ok(())
    }
}
