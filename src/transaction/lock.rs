use crate::core::Result;
use crate::store::DataStore;
use chrono::Duration;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Default lifetime of an advisory lock before another holder may seize it.
pub const DEFAULT_LOCK_EXPIRY_MINUTES: i64 = 15;

/// Pessimistic-locking facade over the store's advisory locks.
///
/// Each service owns a generated holder token, so two services in the same
/// process contend like two separate operators would. Locks outlive store
/// transactions and must be released explicitly; a crashed holder's lock
/// expires and can be seized.
pub struct LockService {
    store: Rc<RefCell<dyn DataStore>>,
    holder: String,
    expiry: Duration,
}

impl LockService {
    pub fn new(store: Rc<RefCell<dyn DataStore>>) -> Self {
        Self {
            store,
            holder: Uuid::new_v4().to_string(),
            expiry: Duration::minutes(DEFAULT_LOCK_EXPIRY_MINUTES),
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Acquire the named lock, failing fast while another live holder has it.
    pub fn acquire(&self, resource: &str) -> Result<()> {
        self.store
            .borrow_mut()
            .acquire_lock(resource, &self.holder, self.expiry)
    }

    /// Release the named lock. Releasing a lock this service does not hold
    /// is a no-op.
    pub fn release(&self, resource: &str) -> Result<()> {
        self.store.borrow_mut().release_lock(resource, &self.holder)
    }
}
