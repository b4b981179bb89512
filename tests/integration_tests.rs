/// End-to-end scenarios across the loader, criteria parsing, ordering and
/// the commit pipeline.
///
/// Run with: cargo test --test integration_tests

use bizorm::{
    ClassDef, Criteria, KeyDef, LookupList, OrderCriteria, OrmContext, OrmError, PropDef,
    PropertyType, SchemaRegistry, Value,
};
use std::rc::Rc;

fn contact_schema() -> SchemaRegistry {
    let mut schema = SchemaRegistry::new();
    schema.add(
        ClassDef::new("ContactPerson", "contact_person")
            .with_prop(PropDef::new("ContactPersonID", PropertyType::Guid))
            .with_prop(PropDef::new("Surname", PropertyType::Text))
            .with_prop(PropDef::new("FirstName", PropertyType::Text))
            .with_prop(PropDef::new("Age", PropertyType::Integer))
            .with_prop(PropDef::new("PartnerID", PropertyType::Guid))
            .with_primary_key(KeyDef::surrogate("ContactPersonID")),
    );
    schema
}

fn save_person(context: &OrmContext, surname: &str, first_name: &str) {
    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Surname", surname).unwrap();
    person.borrow_mut().set("FirstName", first_name).unwrap();
    context.save(&person).unwrap();
}

#[test]
fn test_filtered_ordered_collection_loads_fresh_instances_once() {
    let context = OrmContext::in_memory(contact_schema());
    save_person(&context, "abcd", "aa");
    save_person(&context, "abc", "aa");
    save_person(&context, "other", "bb");

    let criteria = Criteria::parse("FirstName = 'aa'").unwrap();
    let order = OrderCriteria::parse("Surname").unwrap();
    let people = context
        .loader()
        .get_collection("ContactPerson", Some(&criteria), Some(&order))
        .unwrap();

    assert_eq!(people.len(), 2);
    assert_eq!(
        people[0].borrow().get("Surname").unwrap(),
        Value::Text("abc".into())
    );
    assert_eq!(
        people[1].borrow().get("Surname").unwrap(),
        Value::Text("abcd".into())
    );
    for person in &people {
        assert_eq!(person.borrow().after_load_count(), 1);
    }

    // Loading the same collection again returns the same instances and
    // does not fire the post-load hook a second time.
    let again = context
        .loader()
        .get_collection("ContactPerson", Some(&criteria), Some(&order))
        .unwrap();
    for (a, b) in people.iter().zip(again.iter()) {
        assert!(Rc::ptr_eq(a, b));
        assert_eq!(b.borrow().after_load_count(), 1);
    }
}

#[test]
fn test_parsed_criteria_chain_matches_parser_precedence() {
    let context = OrmContext::in_memory(contact_schema());
    save_person(&context, "abc", "aa");

    let criteria = Criteria::parse("Surname = 'abc' and FirstName = 'aa'").unwrap();
    let found = context
        .loader()
        .get_object("ContactPerson", &criteria)
        .unwrap();
    assert!(found.is_some());
}

#[test]
fn test_like_criteria_against_store() {
    let context = OrmContext::in_memory(contact_schema());
    save_person(&context, "Smith", "John");
    save_person(&context, "Smythe", "Jane");
    save_person(&context, "Brown", "Bob");

    let criteria = Criteria::parse("Surname LIKE 'Sm%'").unwrap();
    let people = context
        .loader()
        .get_collection("ContactPerson", Some(&criteria), None)
        .unwrap();
    assert_eq!(people.len(), 2);
}

#[test]
fn test_text_criteria_values_coerce_to_declared_types() {
    let context = OrmContext::in_memory(contact_schema());
    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Surname", "Smith").unwrap();
    person.borrow_mut().set("Age", 30i64).unwrap();
    context.save(&person).unwrap();

    // '30' arrives as text and must compare as an integer.
    let criteria = Criteria::parse("Age = '30'").unwrap();
    let found = context
        .loader()
        .get_object("ContactPerson", &criteria)
        .unwrap();
    assert!(found.is_some());
}

#[test]
fn test_empty_guid_and_empty_text_round_trip_as_null() {
    let context = OrmContext::in_memory(contact_schema());
    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Surname", "Smith").unwrap();
    person.borrow_mut().set("FirstName", "").unwrap();
    person
        .borrow_mut()
        .set("PartnerID", Value::Guid(uuid::Uuid::nil()))
        .unwrap();
    assert_eq!(person.borrow().get("FirstName").unwrap(), Value::Null);
    assert_eq!(person.borrow().get("PartnerID").unwrap(), Value::Null);

    context.save(&person).unwrap();
    drop(person);

    let reloaded = context
        .loader()
        .get_object("ContactPerson", &Criteria::eq("Surname", "Smith"))
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.borrow().get("FirstName").unwrap(), Value::Null);
    assert_eq!(reloaded.borrow().get("PartnerID").unwrap(), Value::Null);
}

#[test]
fn test_coercion_is_idempotent() {
    let samples = vec![
        (PropertyType::Integer, Value::Text("42".into())),
        (PropertyType::Float, Value::Integer(3)),
        (PropertyType::Boolean, Value::Text("true".into())),
        (PropertyType::Text, Value::Integer(7)),
        (PropertyType::Guid, Value::Text(uuid::Uuid::new_v4().to_string())),
    ];
    for (prop_type, value) in samples {
        let once = prop_type.coerce("P", value).unwrap();
        let twice = prop_type.coerce("P", once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn test_failed_coercion_leaves_instance_untouched() {
    let context = OrmContext::in_memory(contact_schema());
    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Age", 30i64).unwrap();

    let err = person.borrow_mut().set("Age", "not a number").unwrap_err();
    assert!(matches!(err, OrmError::InvalidPropertyValue { .. }));
    assert_eq!(person.borrow().get("Age").unwrap(), Value::Integer(30));
}

#[test]
fn test_lookup_property_accepts_key_or_display_value() {
    let mut schema = SchemaRegistry::new();
    let titles = LookupList::new().with("Doctor", 1i64).with("Professor", 2i64);
    schema.add(
        ClassDef::new("ContactPerson", "contact_person")
            .with_prop(PropDef::new("ContactPersonID", PropertyType::Guid))
            .with_prop(PropDef::new("Title", PropertyType::Integer).with_lookup(titles))
            .with_primary_key(KeyDef::surrogate("ContactPersonID")),
    );
    let context = OrmContext::in_memory(schema);

    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Title", "Doctor").unwrap();
    assert_eq!(person.borrow().get("Title").unwrap(), Value::Integer(1));

    person.borrow_mut().set("Title", 2i64).unwrap();
    assert_eq!(person.borrow().get("Title").unwrap(), Value::Integer(2));

    let err = person.borrow_mut().set("Title", "Astronaut").unwrap_err();
    assert!(matches!(err, OrmError::ValueNotInLookupList { .. }));
}

#[test]
fn test_cancel_edit_reverts_to_persisted_state() {
    let context = OrmContext::in_memory(contact_schema());
    let person = context.new_object("ContactPerson").unwrap();
    person.borrow_mut().set("Surname", "Smith").unwrap();
    context.save(&person).unwrap();

    person.borrow_mut().set("Surname", "Jones").unwrap();
    person.borrow_mut().mark_for_delete();
    person.borrow_mut().cancel_edit().unwrap();

    assert_eq!(
        person.borrow().get("Surname").unwrap(),
        Value::Text("Smith".into())
    );
    assert!(!person.borrow().is_deleted());
    assert!(!person.borrow().is_dirty());
}

#[test]
fn test_store_snapshot_survives_context_restart() {
    use bizorm::InMemoryStore;
    use std::cell::RefCell;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let store = Rc::new(RefCell::new(InMemoryStore::new()));
        let context = OrmContext::with_store(store.clone(), contact_schema());
        save_person(&context, "Smith", "John");
        store.borrow().save_snapshot(&path).unwrap();
    }

    let store = InMemoryStore::load_snapshot(&path).unwrap();
    let context = OrmContext::with_store(Rc::new(RefCell::new(store)), contact_schema());
    let found = context
        .loader()
        .get_object("ContactPerson", &Criteria::eq("Surname", "Smith"))
        .unwrap();
    assert!(found.is_some());
}
