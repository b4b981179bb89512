pub mod class_def;
pub mod inheritance;
pub mod lookup;
pub mod registry;
pub mod relationship;

pub use class_def::{ClassDef, KeyDef, PropDef, PropertyType};
pub use inheritance::{InheritanceDef, MappingStrategy};
pub use lookup::LookupList;
pub use registry::SchemaRegistry;
pub use relationship::{Cardinality, DeleteAction, KeyPair, RelationshipDef};
