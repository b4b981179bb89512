// ============================================================================
// Store Module
// ============================================================================
//
// The store collaborator contract: structured selects in, raw rows out,
// plus a single-level transaction boundary and the advisory-lock bookkeeping
// used by sequence-number generation. `InMemoryStore` is the bundled
// implementation; a database dialect adapter would implement the same trait.
//
// ============================================================================

pub mod memory;
pub mod persistence;

pub use memory::InMemoryStore;

use crate::core::{Result, Row};
use crate::criteria::{Criteria, OrderCriteria};
use chrono::Duration;

/// A select specification: criteria plus ordering over one table.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub table: String,
    pub criteria: Option<Criteria>,
    pub order: Option<OrderCriteria>,
}

impl SelectQuery {
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: None,
            order: None,
        }
    }

    pub fn filtered(table: impl Into<String>, criteria: Criteria) -> Self {
        Self {
            table: table.into(),
            criteria: Some(criteria),
            order: None,
        }
    }

    pub fn ordered_by(mut self, order: OrderCriteria) -> Self {
        self.order = Some(order);
        self
    }
}

/// One store-level statement produced by a transaction unit.
#[derive(Debug, Clone)]
pub enum StoreCommand {
    Insert { table: String, row: Row },
    Update {
        table: String,
        criteria: Criteria,
        values: Row,
    },
    Delete { table: String, criteria: Criteria },
}

impl StoreCommand {
    pub fn table_name(&self) -> &str {
        match self {
            Self::Insert { table, .. } => table,
            Self::Update { table, .. } => table,
            Self::Delete { table, .. } => table,
        }
    }
}

/// The store contract the loader and committer depend on.
///
/// `begin_transaction`/`commit_transaction`/`rollback_transaction` bound an
/// all-or-nothing unit of work; statements executed inside the transaction
/// are visible to subsequent selects on the same store before commit.
pub trait DataStore {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// Execute one statement, returning the number of rows affected.
    fn execute(&mut self, command: &StoreCommand) -> Result<usize>;

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit_transaction(&mut self) -> Result<()>;
    fn rollback_transaction(&mut self) -> Result<()>;

    /// Acquire a row-level advisory lock. Fails fast with a typed locking
    /// error while another holder's lock is alive; an expired lock is
    /// considered stale and may be seized.
    fn acquire_lock(&mut self, resource: &str, holder: &str, expiry: Duration) -> Result<()>;

    /// Release an advisory lock. Releasing a lock this holder does not
    /// hold is a no-op.
    fn release_lock(&mut self, resource: &str, holder: &str) -> Result<()>;
}
