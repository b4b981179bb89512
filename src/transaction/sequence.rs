use super::committer::TransactionCommitter;
use super::lock::DEFAULT_LOCK_EXPIRY_MINUTES;
use super::unit::TransactionUnit;
use crate::core::{OrmError, Result, Row, Value};
use crate::criteria::Criteria;
use crate::registry::InstanceRegistry;
use crate::schema::SchemaRegistry;
use crate::store::{DataStore, SelectQuery, StoreCommand};
use chrono::Duration;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Table holding one row per named sequence.
pub const SEQUENCE_TABLE: &str = "sequence_numbers";

const NAME_COLUMN: &str = "SequenceName";
const NUMBER_COLUMN: &str = "SequenceNumber";

fn lock_resource(sequence_name: &str) -> String {
    format!("sequence:{}", sequence_name)
}

/// Gapless sequence-number generator backed by a locked counter row.
///
/// `next_number` takes the sequence's advisory lock, reads the counter and
/// enlists the increment in the caller's transaction, so the new number
/// persists if and only if the caller's commit succeeds. The lock is held
/// until that commit or rollback releases it, keeping concurrent callers
/// from reading the same counter value.
pub struct SequenceNumber {
    store: Rc<RefCell<dyn DataStore>>,
    sequence_name: String,
    holder: String,
    lock_expiry: Duration,
}

impl SequenceNumber {
    pub fn new(store: Rc<RefCell<dyn DataStore>>, sequence_name: impl Into<String>) -> Self {
        Self {
            store,
            sequence_name: sequence_name.into(),
            holder: Uuid::new_v4().to_string(),
            lock_expiry: Duration::minutes(DEFAULT_LOCK_EXPIRY_MINUTES),
        }
    }

    pub fn with_lock_expiry(mut self, expiry: Duration) -> Self {
        self.lock_expiry = expiry;
        self
    }

    fn current_number(&self) -> Result<(i64, bool)> {
        let query = SelectQuery::filtered(
            SEQUENCE_TABLE,
            Criteria::eq(NAME_COLUMN, self.sequence_name.clone()),
        );
        let rows = self.store.borrow().select(&query)?;
        match rows.first() {
            None => Ok((0, false)),
            Some(row) => match row.get_or_null(NUMBER_COLUMN) {
                Value::Integer(n) => Ok((n, true)),
                other => Err(OrmError::Store(format!(
                    "Sequence '{}' holds a non-integer counter: {}",
                    self.sequence_name, other
                ))),
            },
        }
    }

    /// Reserve the next number and enlist its persistence in the caller's
    /// pending transaction.
    pub fn next_number(&self, committer: &mut TransactionCommitter) -> Result<i64> {
        let resource = lock_resource(&self.sequence_name);
        self.store
            .borrow_mut()
            .acquire_lock(&resource, &self.holder, self.lock_expiry)?;

        let (current, exists) = match self.current_number() {
            Ok(result) => result,
            Err(err) => {
                self.store.borrow_mut().release_lock(&resource, &self.holder)?;
                return Err(err);
            }
        };
        let next = current + 1;
        debug!("sequence '{}' reserving {}", self.sequence_name, next);

        committer.add_transaction(Box::new(SequenceUnit {
            store: Rc::clone(&self.store),
            sequence_name: self.sequence_name.clone(),
            number: next,
            exists,
            resource,
            holder: self.holder.clone(),
        }));
        Ok(next)
    }

    /// Set the counter directly, in its own immediate write. Used for
    /// seeding or administrative resets.
    pub fn set_sequence_number(&self, number: i64) -> Result<()> {
        let resource = lock_resource(&self.sequence_name);
        self.store
            .borrow_mut()
            .acquire_lock(&resource, &self.holder, self.lock_expiry)?;
        let result = self.write_number(number);
        self.store.borrow_mut().release_lock(&resource, &self.holder)?;
        result
    }

    fn write_number(&self, number: i64) -> Result<()> {
        let (_, exists) = self.current_number()?;
        let command = sequence_command(&self.sequence_name, number, exists);
        self.store.borrow_mut().execute(&command)?;
        Ok(())
    }
}

fn sequence_command(sequence_name: &str, number: i64, exists: bool) -> StoreCommand {
    if exists {
        StoreCommand::Update {
            table: SEQUENCE_TABLE.into(),
            criteria: Criteria::eq(NAME_COLUMN, sequence_name),
            values: Row::new().with(NUMBER_COLUMN, number),
        }
    } else {
        StoreCommand::Insert {
            table: SEQUENCE_TABLE.into(),
            row: Row::new()
                .with(NAME_COLUMN, sequence_name)
                .with(NUMBER_COLUMN, number),
        }
    }
}

/// The unit persisting one reserved sequence number. Holds the sequence's
/// advisory lock until the owning transaction commits or rolls back.
struct SequenceUnit {
    store: Rc<RefCell<dyn DataStore>>,
    sequence_name: String,
    number: i64,
    exists: bool,
    resource: String,
    holder: String,
}

impl TransactionUnit for SequenceUnit {
    fn describe(&self) -> String {
        format!("sequence '{}' -> {}", self.sequence_name, self.number)
    }

    fn execute(&mut self, store: &mut dyn DataStore, _schema: &SchemaRegistry) -> Result<()> {
        let command = sequence_command(&self.sequence_name, self.number, self.exists);
        store.execute(&command)?;
        Ok(())
    }

    fn roll_back(&mut self) -> Result<()> {
        self.store
            .borrow_mut()
            .release_lock(&self.resource, &self.holder)
    }

    fn committed(&mut self, _registry: &mut dyn InstanceRegistry) -> Result<()> {
        self.store
            .borrow_mut()
            .release_lock(&self.resource, &self.holder)
    }
}
