use super::class_def::ClassDef;
use crate::core::{OrmError, Result};
use std::collections::HashMap;
use std::rc::Rc;

/// Read-only catalog of class definitions, queried by class name.
///
/// Also answers the hierarchy questions the loader needs for polymorphic
/// materialization: direct subclasses, all descendants, and the hierarchy
/// root whose table anchors single-table and class-table mappings.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    classes: HashMap<String, Rc<ClassDef>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: ClassDef) -> Rc<ClassDef> {
        let def = Rc::new(def);
        self.classes.insert(def.class_name.clone(), Rc::clone(&def));
        def
    }

    pub fn get(&self, class_name: &str) -> Result<Rc<ClassDef>> {
        self.classes.get(class_name).cloned().ok_or_else(|| {
            OrmError::InvalidDefinition(format!("Class '{}' is not defined", class_name))
        })
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    pub fn subclasses(&self, class_name: &str) -> Vec<Rc<ClassDef>> {
        self.classes
            .values()
            .filter(|def| def.super_class() == Some(class_name))
            .cloned()
            .collect()
    }

    /// All strict descendants, breadth-first so shallower levels come first.
    pub fn descendants(&self, class_name: &str) -> Vec<Rc<ClassDef>> {
        let mut result = Vec::new();
        let mut frontier = vec![class_name.to_string()];
        while let Some(current) = frontier.pop() {
            for sub in self.subclasses(&current) {
                frontier.push(sub.class_name.clone());
                result.push(sub);
            }
        }
        result
    }

    /// Depth of a class below its hierarchy root (root = 0).
    pub fn depth(&self, def: &ClassDef) -> usize {
        let mut depth = 0;
        let mut current = def.super_class().map(String::from);
        while let Some(name) = current {
            depth += 1;
            current = self
                .classes
                .get(&name)
                .and_then(|d| d.super_class().map(String::from));
        }
        depth
    }

    /// Walk the super chain to the hierarchy root.
    pub fn root_of(&self, def: &Rc<ClassDef>) -> Result<Rc<ClassDef>> {
        let mut current = Rc::clone(def);
        while let Some(super_name) = current.super_class().map(String::from) {
            current = self.get(&super_name)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{InheritanceDef, MappingStrategy, PropDef, PropertyType};

    fn hierarchy() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema.add(
            ClassDef::new("Shape", "shape")
                .with_prop(PropDef::new("ShapeID", PropertyType::Guid)),
        );
        schema.add(ClassDef::new("Circle", "shape").with_inheritance(InheritanceDef::new(
            MappingStrategy::SingleTable,
            "Shape",
            "ShapeType",
            "Circle",
        )));
        schema.add(ClassDef::new("FilledCircle", "shape").with_inheritance(
            InheritanceDef::new(MappingStrategy::SingleTable, "Circle", "ShapeType", "FilledCircle"),
        ));
        schema
    }

    #[test]
    fn test_descendants_walks_all_levels() {
        let schema = hierarchy();
        let names: Vec<String> = schema
            .descendants("Shape")
            .iter()
            .map(|d| d.class_name.clone())
            .collect();
        assert!(names.contains(&"Circle".to_string()));
        assert!(names.contains(&"FilledCircle".to_string()));
    }

    #[test]
    fn test_root_and_depth() {
        let schema = hierarchy();
        let leaf = schema.get("FilledCircle").unwrap();
        assert_eq!(schema.root_of(&leaf).unwrap().class_name, "Shape");
        assert_eq!(schema.depth(&leaf), 2);
    }

    #[test]
    fn test_unknown_class_is_a_definition_error() {
        let schema = hierarchy();
        assert!(matches!(
            schema.get("Nope"),
            Err(crate::core::OrmError::InvalidDefinition(_))
        ));
    }
}
