//! Polymorphic materialization: which tables a declared class reads from,
//! and which concrete leaf class each fetched row materializes as.

use crate::core::{Result, Row};
use crate::schema::{ClassDef, MappingStrategy, SchemaRegistry};
use std::rc::Rc;

/// The mapping strategy governing a class's hierarchy, if it sits in one.
/// The root class of a hierarchy carries no inheritance metadata of its
/// own, so the strategy is read off any descendant when needed.
pub fn hierarchy_strategy(schema: &SchemaRegistry, def: &Rc<ClassDef>) -> Option<MappingStrategy> {
    if let Some(inheritance) = &def.inheritance {
        return Some(inheritance.strategy);
    }
    schema
        .descendants(&def.class_name)
        .first()
        .and_then(|d| d.inheritance.as_ref())
        .map(|i| i.strategy)
}

/// How rows for a declared class are fetched and typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationStrategy {
    /// No hierarchy: one table, rows are the declared class.
    Simple,
    /// One shared table; the discriminator column types each row.
    SingleTable,
    /// Root-anchored storage with per-level property tables joined by the
    /// dialect adapter. The bundled store keeps the whole row in the root
    /// table, so fetch and leaf resolution behave as single-table.
    ClassTable,
    /// One complete table per concrete class; the source table types the
    /// row, no discriminator needed.
    ConcreteTable,
}

pub fn for_class(schema: &SchemaRegistry, def: &Rc<ClassDef>) -> MaterializationStrategy {
    match hierarchy_strategy(schema, def) {
        None => MaterializationStrategy::Simple,
        Some(MappingStrategy::SingleTable) => MaterializationStrategy::SingleTable,
        Some(MappingStrategy::ClassTable) => MaterializationStrategy::ClassTable,
        Some(MappingStrategy::ConcreteTable) => MaterializationStrategy::ConcreteTable,
    }
}

impl MaterializationStrategy {
    /// The tables a select for `def` must visit, each paired with the class
    /// that gives rows from that table their type context.
    pub fn tables(
        &self,
        schema: &SchemaRegistry,
        def: &Rc<ClassDef>,
    ) -> Result<Vec<(String, Rc<ClassDef>)>> {
        match self {
            Self::Simple => Ok(vec![(def.table_name.clone(), Rc::clone(def))]),
            Self::SingleTable | Self::ClassTable => {
                let root = schema.root_of(def)?;
                Ok(vec![(root.table_name.clone(), Rc::clone(def))])
            }
            Self::ConcreteTable => {
                let mut tables = Vec::new();
                if !def.is_abstract {
                    tables.push((def.table_name.clone(), Rc::clone(def)));
                }
                for descendant in schema.descendants(&def.class_name) {
                    if !descendant.is_abstract {
                        tables.push((descendant.table_name.clone(), descendant));
                    }
                }
                Ok(tables)
            }
        }
    }

    /// The concrete class a fetched row belongs to.
    ///
    /// Discriminator-driven strategies pick the deepest class at or below
    /// the declared one whose discriminator marker matches the row; a row
    /// carrying no recognized marker stays the declared class. Concrete-table
    /// rows are typed by the table they came from.
    pub fn resolve_leaf(
        &self,
        schema: &SchemaRegistry,
        declared: &Rc<ClassDef>,
        context: &Rc<ClassDef>,
        row: &Row,
    ) -> Result<Rc<ClassDef>> {
        match self {
            Self::Simple => Ok(Rc::clone(declared)),
            Self::ConcreteTable => Ok(Rc::clone(context)),
            Self::SingleTable | Self::ClassTable => {
                let mut leaf = Rc::clone(declared);
                let mut leaf_depth = schema.depth(declared);
                for candidate in schema.descendants(&declared.class_name) {
                    let Some(inheritance) = &candidate.inheritance else {
                        continue;
                    };
                    if row.get_or_null(&inheritance.discriminator_column)
                        != inheritance.discriminator_value
                    {
                        continue;
                    }
                    let depth = schema.depth(&candidate);
                    if depth > leaf_depth {
                        leaf = candidate;
                        leaf_depth = depth;
                    }
                }
                Ok(leaf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InheritanceDef, KeyDef, PropDef, PropertyType};

    fn single_table_schema() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema.add(
            ClassDef::new("Shape", "shape")
                .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
                .with_primary_key(KeyDef::surrogate("ShapeID")),
        );
        schema.add(
            ClassDef::new("Circle", "shape")
                .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
                .with_primary_key(KeyDef::surrogate("ShapeID"))
                .with_inheritance(InheritanceDef::new(
                    MappingStrategy::SingleTable,
                    "Shape",
                    "ShapeType",
                    "Circle",
                )),
        );
        schema.add(
            ClassDef::new("FilledCircle", "shape")
                .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
                .with_primary_key(KeyDef::surrogate("ShapeID"))
                .with_inheritance(InheritanceDef::new(
                    MappingStrategy::SingleTable,
                    "Circle",
                    "ShapeType",
                    "FilledCircle",
                )),
        );
        schema
    }

    #[test]
    fn test_root_class_inherits_strategy_from_descendants() {
        let schema = single_table_schema();
        let root = schema.get("Shape").unwrap();
        assert_eq!(
            for_class(&schema, &root),
            MaterializationStrategy::SingleTable
        );
    }

    #[test]
    fn test_single_table_reads_root_table_only() {
        let schema = single_table_schema();
        let leaf = schema.get("FilledCircle").unwrap();
        let strategy = for_class(&schema, &leaf);
        let tables = strategy.tables(&schema, &leaf).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0, "shape");
    }

    #[test]
    fn test_deepest_discriminator_match_wins() {
        let schema = single_table_schema();
        let declared = schema.get("Shape").unwrap();
        let strategy = for_class(&schema, &declared);
        let row = Row::new().with("ShapeType", "FilledCircle");
        let leaf = strategy
            .resolve_leaf(&schema, &declared, &declared, &row)
            .unwrap();
        assert_eq!(leaf.class_name, "FilledCircle");
    }

    #[test]
    fn test_unrecognized_marker_stays_declared_class() {
        let schema = single_table_schema();
        let declared = schema.get("Shape").unwrap();
        let strategy = for_class(&schema, &declared);
        let row = Row::new().with("ShapeType", "Hexagon");
        let leaf = strategy
            .resolve_leaf(&schema, &declared, &declared, &row)
            .unwrap();
        assert_eq!(leaf.class_name, "Shape");
    }

    #[test]
    fn test_concrete_table_skips_abstract_classes() {
        let mut schema = SchemaRegistry::new();
        schema.add(
            ClassDef::new("Vehicle", "vehicle")
                .with_prop(PropDef::new("VehicleID", PropertyType::Guid))
                .with_primary_key(KeyDef::surrogate("VehicleID"))
                .abstract_class(),
        );
        schema.add(
            ClassDef::new("Car", "car")
                .with_prop(PropDef::new("VehicleID", PropertyType::Guid))
                .with_primary_key(KeyDef::surrogate("VehicleID"))
                .with_inheritance(InheritanceDef::new(
                    MappingStrategy::ConcreteTable,
                    "Vehicle",
                    "VehicleType",
                    "Car",
                )),
        );
        let declared = schema.get("Vehicle").unwrap();
        let strategy = for_class(&schema, &declared);
        assert_eq!(strategy, MaterializationStrategy::ConcreteTable);
        let tables = strategy.tables(&schema, &declared).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0, "car");
    }
}
