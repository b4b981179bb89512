// ============================================================================
// BizORM Library
// ============================================================================

pub mod core;
pub mod criteria;
pub mod loader;
pub mod object;
pub mod registry;
pub mod schema;
pub mod store;
pub mod transaction;

// Re-export main types for convenience
pub use core::{DATE_FORMAT, OrmError, Result, Row, Value};
pub use criteria::{Criteria, Operator, OrderCriteria};
pub use loader::Loader;
pub use object::{EntityInstance, Identity, SharedInstance, ValueSnapshot};
pub use registry::{InstanceRegistry, MapRegistry, NullRegistry};
pub use schema::{
    Cardinality, ClassDef, DeleteAction, InheritanceDef, KeyDef, LookupList, MappingStrategy,
    PropDef, PropertyType, RelationshipDef, SchemaRegistry,
};
pub use store::{DataStore, InMemoryStore};
pub use transaction::{LockService, SequenceNumber, TransactionCommitter};

use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// High-level Persistence Context
// ============================================================================

/// One persistence session: a store, an identity map and a schema catalog
/// wired together.
///
/// This is the recommended entry point for applications. Instances handed
/// out by the same context share the identity map, so loading the same
/// persisted row twice yields the same in-memory object.
///
/// # Examples
///
/// ```
/// use bizorm::{
///     ClassDef, Criteria, KeyDef, OrmContext, PropDef, PropertyType, SchemaRegistry,
/// };
///
/// # fn main() -> bizorm::Result<()> {
/// let mut schema = SchemaRegistry::new();
/// schema.add(
///     ClassDef::new("ContactPerson", "contact_person")
///         .with_prop(PropDef::new("ContactPersonID", PropertyType::Guid))
///         .with_prop(PropDef::new("Surname", PropertyType::Text))
///         .with_primary_key(KeyDef::surrogate("ContactPersonID")),
/// );
/// let context = OrmContext::in_memory(schema);
///
/// let person = context.new_object("ContactPerson")?;
/// person.borrow_mut().set("Surname", "Smith")?;
/// context.save(&person)?;
///
/// let found = context
///     .loader()
///     .get_object("ContactPerson", &Criteria::eq("Surname", "Smith"))?
///     .expect("person was saved");
/// assert!(std::rc::Rc::ptr_eq(&person, &found));
/// # Ok(())
/// # }
/// ```
pub struct OrmContext {
    store: Rc<RefCell<dyn DataStore>>,
    registry: Rc<RefCell<dyn InstanceRegistry>>,
    schema: Rc<SchemaRegistry>,
    loader: Loader,
}

impl OrmContext {
    /// A context over the bundled in-memory store.
    pub fn in_memory(schema: SchemaRegistry) -> Self {
        Self::with_store(Rc::new(RefCell::new(InMemoryStore::new())), schema)
    }

    pub fn with_store(store: Rc<RefCell<dyn DataStore>>, schema: SchemaRegistry) -> Self {
        let schema = Rc::new(schema);
        let registry: Rc<RefCell<dyn InstanceRegistry>> =
            Rc::new(RefCell::new(MapRegistry::new()));
        let loader = Loader::new(Rc::clone(&store), Rc::clone(&registry), Rc::clone(&schema));
        Self {
            store,
            registry,
            schema,
            loader,
        }
    }

    /// Swap the identity map out, e.g. for a `NullRegistry`.
    pub fn with_registry(mut self, registry: Rc<RefCell<dyn InstanceRegistry>>) -> Self {
        self.registry = registry;
        self.loader = Loader::new(
            Rc::clone(&self.store),
            Rc::clone(&self.registry),
            Rc::clone(&self.schema),
        );
        self
    }

    pub fn store(&self) -> &Rc<RefCell<dyn DataStore>> {
        &self.store
    }

    pub fn registry(&self) -> &Rc<RefCell<dyn InstanceRegistry>> {
        &self.registry
    }

    pub fn schema(&self) -> &Rc<SchemaRegistry> {
        &self.schema
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Construct a fresh, unpersisted instance of a defined class.
    pub fn new_object(&self, class_name: &str) -> Result<SharedInstance> {
        let def = self.schema.get(class_name)?;
        EntityInstance::new_shared(def)
    }

    /// A committer bound to this context's store, registry and schema.
    pub fn committer(&self) -> TransactionCommitter {
        TransactionCommitter::new(
            Rc::clone(&self.store),
            Rc::clone(&self.registry),
            Rc::clone(&self.schema),
        )
    }

    /// Persist one instance in its own transaction.
    pub fn save(&self, instance: &SharedInstance) -> Result<()> {
        let mut committer = self.committer();
        committer.add_business_object(instance)?;
        committer.commit()
    }

    /// Mark one instance for deletion and commit, expanding relationship
    /// delete actions.
    pub fn delete(&self, instance: &SharedInstance) -> Result<()> {
        instance.borrow_mut().mark_for_delete();
        self.save(instance)
    }

    /// A sequence-number generator bound to this context's store.
    pub fn sequence(&self, name: impl Into<String>) -> SequenceNumber {
        SequenceNumber::new(Rc::clone(&self.store), name)
    }

    /// An advisory-lock service bound to this context's store.
    pub fn lock_service(&self) -> LockService {
        LockService::new(Rc::clone(&self.store))
    }
}
