pub mod error;
pub mod types;
pub mod value;

pub use error::{OrmError, Result};
pub use types::Row;
pub use value::{DATE_FORMAT, Value};
