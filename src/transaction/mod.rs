// ============================================================================
// Transaction Module
// ============================================================================
//
// Atomic persistence of entity instances. Callers enlist instances (or
// custom units) with a `TransactionCommitter`, which derives each unit's
// operation from lifecycle state, expands deletes through relationship
// delete actions, and executes everything inside one store transaction.
//
// ============================================================================

pub mod committer;
pub mod lock;
pub mod sequence;
pub mod unit;

pub use committer::TransactionCommitter;
pub use lock::{DEFAULT_LOCK_EXPIRY_MINUTES, LockService};
pub use sequence::{SEQUENCE_TABLE, SequenceNumber};
pub use unit::{BusinessObjectUnit, DereferenceUnit, Operation, StoreActionUnit, TransactionUnit};
