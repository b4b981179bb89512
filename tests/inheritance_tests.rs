/// Polymorphic persistence and loading across the three mapping strategies.
///
/// Run with: cargo test --test inheritance_tests

use bizorm::{
    ClassDef, Criteria, InheritanceDef, KeyDef, MappingStrategy, OrmContext, PropDef,
    PropertyType, SchemaRegistry, Value,
};

fn shape_schema(strategy: MappingStrategy) -> SchemaRegistry {
    let table_for = |class: &str| match strategy {
        MappingStrategy::ConcreteTable => match class {
            "Circle" => "circle",
            "FilledCircle" => "filled_circle",
            _ => "shape",
        },
        _ => "shape",
    };
    let mut schema = SchemaRegistry::new();
    schema.add(
        ClassDef::new("Shape", table_for("Shape"))
            .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
            .with_prop(PropDef::new("Name", PropertyType::Text))
            .with_primary_key(KeyDef::surrogate("ShapeID")),
    );
    schema.add(
        ClassDef::new("Circle", table_for("Circle"))
            .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
            .with_prop(PropDef::new("Name", PropertyType::Text))
            .with_prop(PropDef::new("Radius", PropertyType::Integer))
            .with_primary_key(KeyDef::surrogate("ShapeID"))
            .with_inheritance(InheritanceDef::new(strategy, "Shape", "ShapeType", "Circle")),
    );
    schema.add(
        ClassDef::new("FilledCircle", table_for("FilledCircle"))
            .with_prop(PropDef::new("ShapeID", PropertyType::Guid))
            .with_prop(PropDef::new("Name", PropertyType::Text))
            .with_prop(PropDef::new("Radius", PropertyType::Integer))
            .with_prop(PropDef::new("Colour", PropertyType::Text))
            .with_primary_key(KeyDef::surrogate("ShapeID"))
            .with_inheritance(InheritanceDef::new(
                strategy,
                "Circle",
                "ShapeType",
                "FilledCircle",
            )),
    );
    schema
}

fn saved_shapes(context: &OrmContext) {
    let shape = context.new_object("Shape").unwrap();
    shape.borrow_mut().set("Name", "plain").unwrap();
    context.save(&shape).unwrap();

    let circle = context.new_object("Circle").unwrap();
    circle.borrow_mut().set("Name", "round").unwrap();
    circle.borrow_mut().set("Radius", 10i64).unwrap();
    context.save(&circle).unwrap();

    let filled = context.new_object("FilledCircle").unwrap();
    filled.borrow_mut().set("Name", "solid").unwrap();
    filled.borrow_mut().set("Radius", 5i64).unwrap();
    filled.borrow_mut().set("Colour", "red").unwrap();
    context.save(&filled).unwrap();
}

#[test]
fn test_single_table_supertype_load_resolves_leaf_classes() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::SingleTable));
    saved_shapes(&context);

    let shapes = context.loader().get_collection("Shape", None, None).unwrap();
    assert_eq!(shapes.len(), 3);
    let mut names: Vec<String> = shapes
        .iter()
        .map(|s| s.borrow().class_name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Circle", "FilledCircle", "Shape"]);
}

#[test]
fn test_single_table_subtype_load_materializes_subclass_props() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::SingleTable));
    saved_shapes(&context);

    let found = context
        .loader()
        .get_object("Shape", &Criteria::eq("Name", "solid"))
        .unwrap()
        .unwrap();
    assert_eq!(found.borrow().class_name(), "FilledCircle");
    assert_eq!(
        found.borrow().get("Colour").unwrap(),
        Value::Text("red".into())
    );
}

#[test]
fn test_single_table_load_shares_identity_with_subtype_handle() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::SingleTable));
    let circle = context.new_object("Circle").unwrap();
    circle.borrow_mut().set("Name", "round").unwrap();
    context.save(&circle).unwrap();

    let via_supertype = context
        .loader()
        .get_object("Shape", &Criteria::eq("Name", "round"))
        .unwrap()
        .unwrap();
    assert!(std::rc::Rc::ptr_eq(&circle, &via_supertype));
}

#[test]
fn test_concrete_table_rows_live_in_their_own_tables() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::ConcreteTable));
    saved_shapes(&context);

    // A supertype load merges the per-class tables.
    let shapes = context.loader().get_collection("Shape", None, None).unwrap();
    assert_eq!(shapes.len(), 3);

    // A subtype load covers its own subtree only.
    let circles = context.loader().get_collection("Circle", None, None).unwrap();
    assert_eq!(circles.len(), 2);
    let filled = context
        .loader()
        .get_collection("FilledCircle", None, None)
        .unwrap();
    assert_eq!(filled.len(), 1);
    assert_eq!(filled[0].borrow().class_name(), "FilledCircle");
}

#[test]
fn test_class_table_hierarchy_loads_through_root_table() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::ClassTable));
    saved_shapes(&context);

    let found = context
        .loader()
        .get_object("Shape", &Criteria::eq("Name", "round"))
        .unwrap()
        .unwrap();
    assert_eq!(found.borrow().class_name(), "Circle");
    assert_eq!(found.borrow().get("Radius").unwrap(), Value::Integer(10));
}

#[test]
fn test_subtype_delete_removes_only_its_row() {
    let context = OrmContext::in_memory(shape_schema(MappingStrategy::SingleTable));
    saved_shapes(&context);

    let filled = context
        .loader()
        .get_object("FilledCircle", &Criteria::eq("Name", "solid"))
        .unwrap()
        .unwrap();
    context.delete(&filled).unwrap();

    let shapes = context.loader().get_collection("Shape", None, None).unwrap();
    assert_eq!(shapes.len(), 2);
}
