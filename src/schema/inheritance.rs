use crate::core::Value;

/// How a class hierarchy maps onto tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStrategy {
    /// The whole hierarchy shares the root class's table; a discriminator
    /// column identifies the concrete type of each row.
    SingleTable,
    /// Each level owns a table for its own properties, joined on the
    /// primary key; discriminators identify the concrete type.
    ClassTable,
    /// Each concrete class owns a complete table of its own.
    ConcreteTable,
}

/// Inheritance metadata carried by a subclass definition.
///
/// Levels of one hierarchy may share a single discriminator column (each
/// concrete class writes its own marker value) or use a column per level;
/// leaf resolution treats both identically.
#[derive(Debug, Clone)]
pub struct InheritanceDef {
    pub strategy: MappingStrategy,
    pub super_class: String,
    pub discriminator_column: String,
    pub discriminator_value: Value,
}

impl InheritanceDef {
    pub fn new(
        strategy: MappingStrategy,
        super_class: impl Into<String>,
        discriminator_column: impl Into<String>,
        discriminator_value: impl Into<Value>,
    ) -> Self {
        Self {
            strategy,
            super_class: super_class.into(),
            discriminator_column: discriminator_column.into(),
            discriminator_value: discriminator_value.into(),
        }
    }
}
