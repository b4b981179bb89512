pub mod identity;
pub mod instance;
pub mod property;

pub use identity::{Identity, ValueSnapshot, row_signature};
pub use instance::{EntityInstance, LifecycleFlags, SharedInstance};
pub use property::PropertyCell;
