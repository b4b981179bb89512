// ============================================================================
// Instance Registry (Identity Map)
// ============================================================================
//
// Process-scoped cache enforcing at most one live in-memory representation
// per persisted identity. Entries hold weak back-references: the registry
// tracks instances without owning their business lifetime. Only the loader
// and the transaction committer add or remove entries.
//
// ============================================================================

use crate::core::Result;
use crate::criteria::Criteria;
use crate::object::SharedInstance;
use log::debug;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// The identity-map contract. All mutating operations are idempotent;
/// queries never touch the store.
pub trait InstanceRegistry {
    /// Register an instance under its identity signature. Re-adding an
    /// already-registered instance is a no-op, not an error.
    fn add(&mut self, instance: &SharedInstance);

    /// The live instance registered under this signature, if any.
    fn get(&self, key: &str) -> Option<SharedInstance>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove an instance. Double-remove is a no-op.
    fn remove(&mut self, instance: &SharedInstance);

    fn remove_key(&mut self, key: &str);

    /// Move an instance from a stale signature to its current one, after a
    /// committed identity change.
    fn rekey(&mut self, old_key: &str, instance: &SharedInstance);

    /// Empty the registry without touching store state.
    fn clear(&mut self);

    /// Number of live registered instances.
    fn count(&self) -> usize;

    /// Linear scan over currently-registered instances of one class,
    /// evaluating the criteria in memory. Returns only resident objects,
    /// which is intentionally a partial view of the store.
    fn find(&self, class_name: &str, criteria: &Criteria) -> Result<Vec<SharedInstance>>;

    fn find_first(&self, class_name: &str, criteria: &Criteria) -> Result<Option<SharedInstance>> {
        Ok(self.find(class_name, criteria)?.into_iter().next())
    }
}

fn instance_key(instance: &SharedInstance) -> String {
    instance.borrow().identity().key_signature()
}

/// The standard weak-reference identity map.
#[derive(Default)]
pub struct MapRegistry {
    entries: HashMap<String, Weak<std::cell::RefCell<crate::object::EntityInstance>>>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }
}

impl InstanceRegistry for MapRegistry {
    fn add(&mut self, instance: &SharedInstance) {
        self.prune();
        let key = instance_key(instance);
        self.entries.entry(key).or_insert_with(|| Rc::downgrade(instance));
    }

    fn get(&self, key: &str) -> Option<SharedInstance> {
        self.entries.get(key).and_then(Weak::upgrade)
    }

    fn remove(&mut self, instance: &SharedInstance) {
        let key = instance_key(instance);
        self.entries.remove(&key);
    }

    fn remove_key(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn rekey(&mut self, old_key: &str, instance: &SharedInstance) {
        let new_key = instance_key(instance);
        debug!("registry rekey: '{}' -> '{}'", old_key, new_key);
        self.entries.remove(old_key);
        self.entries.insert(new_key, Rc::downgrade(instance));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn count(&self) -> usize {
        self.entries.values().filter(|w| w.strong_count() > 0).count()
    }

    fn find(&self, class_name: &str, criteria: &Criteria) -> Result<Vec<SharedInstance>> {
        let mut matched = Vec::new();
        for weak in self.entries.values() {
            if let Some(instance) = weak.upgrade() {
                let is_match = {
                    let borrowed = instance.borrow();
                    borrowed.class_name() == class_name && borrowed.matches(criteria)?
                };
                if is_match {
                    matched.push(instance);
                }
            }
        }
        Ok(matched)
    }
}

/// Disables identity-map semantics entirely: every mutation is a no-op and
/// every query reports nothing found. Used for stateless configurations.
#[derive(Default)]
pub struct NullRegistry;

impl NullRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl InstanceRegistry for NullRegistry {
    fn add(&mut self, _instance: &SharedInstance) {}

    fn get(&self, _key: &str) -> Option<SharedInstance> {
        None
    }

    fn remove(&mut self, _instance: &SharedInstance) {}

    fn remove_key(&mut self, _key: &str) {}

    fn rekey(&mut self, _old_key: &str, _instance: &SharedInstance) {}

    fn clear(&mut self) {}

    fn count(&self) -> usize {
        0
    }

    fn find(&self, _class_name: &str, _criteria: &Criteria) -> Result<Vec<SharedInstance>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::EntityInstance;
    use crate::schema::{ClassDef, KeyDef, PropDef, PropertyType};

    fn person_def() -> Rc<ClassDef> {
        Rc::new(
            ClassDef::new("Person", "person")
                .with_prop(PropDef::new("PersonID", PropertyType::Guid))
                .with_prop(PropDef::new("Surname", PropertyType::Text))
                .with_primary_key(KeyDef::surrogate("PersonID")),
        )
    }

    fn make_person(surname: &str) -> SharedInstance {
        let inst = EntityInstance::new_shared(person_def()).unwrap();
        inst.borrow_mut().set("Surname", surname).unwrap();
        inst
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = MapRegistry::new();
        let inst = make_person("Smith");
        registry.add(&inst);
        registry.add(&inst);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_get_returns_same_instance() {
        let mut registry = MapRegistry::new();
        let inst = make_person("Smith");
        registry.add(&inst);
        let key = inst.borrow().identity().key_signature();
        let found = registry.get(&key).unwrap();
        assert!(Rc::ptr_eq(&inst, &found));
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut registry = MapRegistry::new();
        let inst = make_person("Smith");
        registry.add(&inst);
        registry.remove(&inst);
        registry.remove(&inst);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_weak_entries_do_not_keep_instances_alive() {
        let mut registry = MapRegistry::new();
        let key = {
            let inst = make_person("Smith");
            registry.add(&inst);
            inst.borrow().identity().key_signature()
        };
        // The only strong handle is gone.
        assert!(registry.get(&key).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_find_scans_resident_instances_only() {
        let mut registry = MapRegistry::new();
        let smith = make_person("Smith");
        let jones = make_person("Jones");
        registry.add(&smith);
        registry.add(&jones);
        let found = registry
            .find("Person", &Criteria::eq("Surname", "Smith"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(Rc::ptr_eq(&found[0], &smith));
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = MapRegistry::new();
        let inst = make_person("Smith");
        registry.add(&inst);
        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_null_registry_reports_nothing() {
        let mut registry = NullRegistry::new();
        let inst = make_person("Smith");
        registry.add(&inst);
        assert_eq!(registry.count(), 0);
        let key = inst.borrow().identity().key_signature();
        assert!(registry.get(&key).is_none());
        assert!(
            registry
                .find("Person", &Criteria::eq("Surname", "Smith"))
                .unwrap()
                .is_empty()
        );
    }
}
