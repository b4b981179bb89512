use super::identity::{Identity, ValueSnapshot};
use super::property::PropertyCell;
use crate::core::{OrmError, Result, Row, Value};
use crate::schema::ClassDef;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Shared handle to a live entity instance. The registry and loader hand
/// out clones of the same handle so one persisted identity has exactly one
/// in-memory representation.
pub type SharedInstance = Rc<RefCell<EntityInstance>>;

/// Lifecycle flag snapshot, captured before a transaction so a failed
/// commit can restore the instance's pre-transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleFlags {
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_editing: bool,
}

/// An aggregate of typed property cells plus an identity plus lifecycle
/// flags: the unit of business logic and persistence.
///
/// State transitions:
/// ```text
/// New ──save──> Persisted ──edit──> Persisted+Dirty ──save──> Persisted
///  │                                      │
///  └────────────── delete ────────────────┘
///                     │
///                     v
///            Deleted+Editing ──save──> Deleted+New (gone from store/registry)
///                     │
///                     └──rollback──> prior state restored
/// ```
pub struct EntityInstance {
    class_def: Rc<ClassDef>,
    cells: BTreeMap<String, PropertyCell>,
    identity: Identity,
    is_new: bool,
    is_deleted: bool,
    is_editing: bool,
    after_load_count: u32,
    after_load_hook: Option<Box<dyn FnMut()>>,
}

impl EntityInstance {
    /// Construct a fresh, unpersisted instance. Schema defaults are
    /// applied and a single-property surrogate GUID key is auto-assigned.
    pub fn new(class_def: Rc<ClassDef>) -> Result<Self> {
        let mut cells = BTreeMap::new();
        for prop in &class_def.props {
            let mut cell = PropertyCell::from_def(prop);
            if let Some(default) = &prop.default {
                cell.initialise(default.clone())?;
            }
            cells.insert(prop.name.clone(), cell);
        }

        let key = &class_def.primary_key;
        if key.surrogate && key.prop_names.len() == 1 {
            let prop_name = &key.prop_names[0];
            if let Some(cell) = cells.get_mut(prop_name)
                && cell.value().is_null()
            {
                cell.initialise(Value::Guid(Uuid::new_v4()))?;
            }
        }

        let initial: Vec<(String, Value)> = key
            .prop_names
            .iter()
            .filter_map(|name| cells.get(name).map(|c| (name.clone(), c.value().clone())))
            .collect();
        let identity = Identity::new(class_def.class_name.clone(), key, &initial);

        Ok(Self {
            class_def,
            cells,
            identity,
            is_new: true,
            is_deleted: false,
            is_editing: false,
            after_load_count: 0,
            after_load_hook: None,
        })
    }

    pub fn new_shared(class_def: Rc<ClassDef>) -> Result<SharedInstance> {
        Ok(Rc::new(RefCell::new(Self::new(class_def)?)))
    }

    pub fn class_def(&self) -> &Rc<ClassDef> {
        &self.class_def
    }

    pub fn class_name(&self) -> &str {
        &self.class_def.class_name
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn cell(&self, prop: &str) -> Result<&PropertyCell> {
        self.cells.get(prop).ok_or_else(|| {
            OrmError::InvalidDefinition(format!(
                "Property '{}' is not defined on class '{}'",
                prop, self.class_def.class_name
            ))
        })
    }

    pub fn cell_mut(&mut self, prop: &str) -> Result<&mut PropertyCell> {
        let class_name = self.class_def.class_name.clone();
        self.cells.get_mut(prop).ok_or_else(|| {
            OrmError::InvalidDefinition(format!(
                "Property '{}' is not defined on class '{}'",
                prop, class_name
            ))
        })
    }

    /// Current value of a property.
    pub fn get(&self, prop: &str) -> Result<Value> {
        Ok(self.cell(prop)?.value().clone())
    }

    /// Assign a property value through coercion/validation. Key-constituent
    /// changes also rotate the identity's current/previous snapshots.
    pub fn set(&mut self, prop: &str, value: impl Into<Value>) -> Result<()> {
        let prop_def = self.class_def.require_prop(prop)?;
        if prop_def.read_only {
            return Err(OrmError::InvalidDefinition(format!(
                "Property '{}' on class '{}' is read-only",
                prop, self.class_def.class_name
            )));
        }
        let cell = self.cells.get_mut(prop).expect("cell exists for defined prop");
        cell.set_value(value.into())?;
        if self.identity.contains(prop) {
            let coerced = cell.value().clone();
            self.identity.set(prop, coerced)?;
        }
        self.is_editing = true;
        Ok(())
    }

    /// Hydrate one property from the store: current and persisted move
    /// together, no dirtiness, no edit session.
    pub fn initialise(&mut self, prop: &str, value: Value) -> Result<()> {
        let cell = self.cell_mut(prop)?;
        cell.initialise(value)?;
        if self.identity.contains(prop) {
            let coerced = self.cell(prop)?.value().clone();
            self.identity.hydrate(prop, coerced)?;
        }
        Ok(())
    }

    /// Hydrate every defined property present in the row.
    pub fn hydrate_from_row(&mut self, row: &Row) -> Result<()> {
        let prop_names: Vec<String> = self.class_def.props.iter().map(|p| p.name.clone()).collect();
        for name in prop_names {
            if let Some(value) = row.get(&name) {
                self.initialise(&name, value.clone())?;
            }
        }
        self.is_new = false;
        Ok(())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    /// Any cell's current value differs from its persisted value, or the
    /// identity carries an uncommitted key change.
    pub fn is_dirty(&self) -> bool {
        self.identity.is_dirty() || self.cells.values().any(PropertyCell::is_dirty)
    }

    pub fn mark_for_delete(&mut self) {
        self.is_deleted = true;
        self.is_editing = true;
    }

    /// Abandon the current edit session: revert all cells and key values
    /// to their persisted state.
    pub fn cancel_edit(&mut self) -> Result<()> {
        let prop_names: Vec<String> = self.cells.keys().cloned().collect();
        for name in prop_names {
            let persisted = self.cell(&name)?.persisted_value().clone();
            let cell = self.cells.get_mut(&name).expect("cell exists");
            cell.restore();
            if self.identity.contains(&name) {
                self.identity.set(&name, persisted)?;
            }
        }
        self.is_deleted = false;
        self.is_editing = false;
        Ok(())
    }

    pub fn flags(&self) -> LifecycleFlags {
        LifecycleFlags {
            is_new: self.is_new,
            is_deleted: self.is_deleted,
            is_editing: self.is_editing,
        }
    }

    pub fn restore_flags(&mut self, flags: LifecycleFlags) {
        self.is_new = flags.is_new;
        self.is_deleted = flags.is_deleted;
        self.is_editing = flags.is_editing;
    }

    /// Post-load hook: invoked by the loader exactly once per fresh
    /// materialization from the store, never for a cache-hit return.
    pub fn after_load(&mut self) {
        self.after_load_count += 1;
        if let Some(hook) = &mut self.after_load_hook {
            hook();
        }
    }

    pub fn after_load_count(&self) -> u32 {
        self.after_load_count
    }

    pub fn set_after_load_hook(&mut self, hook: Box<dyn FnMut()>) {
        self.after_load_hook = Some(hook);
    }

    /// Accept a successful insert/update: all cells and the identity take
    /// their current values as persisted, the edit session closes.
    pub fn accept_save(&mut self) {
        for cell in self.cells.values_mut() {
            cell.back_up();
        }
        self.identity.back_up();
        self.is_new = false;
        self.is_editing = false;
    }

    /// Accept a successful delete: the instance leaves active storage and
    /// reports `is_deleted && is_new`.
    pub fn accept_delete(&mut self) {
        self.is_new = true;
        self.is_editing = false;
    }

    /// The instance's properties as a raw row of current values.
    pub fn current_row(&self) -> Row {
        let mut row = Row::new();
        for (name, cell) in &self.cells {
            row.set(name.clone(), cell.value().clone());
        }
        row
    }

    /// The instance's properties as a raw row of persisted values.
    pub fn persisted_row(&self) -> Row {
        let mut row = Row::new();
        for (name, cell) in &self.cells {
            row.set(name.clone(), cell.persisted_value().clone());
        }
        row
    }

    /// Evaluate criteria against this instance's current values.
    pub fn matches(&self, criteria: &crate::criteria::Criteria) -> Result<bool> {
        criteria.matches_with(&mut |prop| self.get(prop))
    }

    pub fn identity_snapshot_string(&self, snapshot: ValueSnapshot) -> String {
        self.identity.as_string(snapshot)
    }
}

impl fmt::Debug for EntityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityInstance")
            .field("class", &self.class_def.class_name)
            .field("identity", &self.identity.to_string())
            .field("is_new", &self.is_new)
            .field("is_deleted", &self.is_deleted)
            .field("is_editing", &self.is_editing)
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyDef, PropDef, PropertyType};

    fn person_def() -> Rc<ClassDef> {
        Rc::new(
            ClassDef::new("Person", "person")
                .with_prop(PropDef::new("PersonID", PropertyType::Guid))
                .with_prop(PropDef::new("Surname", PropertyType::Text))
                .with_prop(PropDef::new("Age", PropertyType::Integer))
                .with_primary_key(KeyDef::surrogate("PersonID")),
        )
    }

    #[test]
    fn test_new_instance_state() {
        let inst = EntityInstance::new(person_def()).unwrap();
        assert!(inst.is_new());
        assert!(!inst.is_deleted());
        assert!(!inst.is_editing());
        // Surrogate key auto-assigned.
        assert!(!inst.get("PersonID").unwrap().is_null());
    }

    #[test]
    fn test_set_marks_editing_and_dirty() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.set("Surname", "Smith").unwrap();
        assert!(inst.is_editing());
        assert!(inst.is_dirty());
    }

    #[test]
    fn test_accept_save_clears_state() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.set("Surname", "Smith").unwrap();
        inst.accept_save();
        assert!(!inst.is_new());
        assert!(!inst.is_editing());
        assert!(!inst.is_dirty());
        assert_eq!(
            inst.cell("Surname").unwrap().persisted_value(),
            &Value::Text("Smith".into())
        );
    }

    #[test]
    fn test_delete_lifecycle() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.accept_save();
        inst.mark_for_delete();
        assert!(inst.is_deleted() && inst.is_editing());
        inst.accept_delete();
        assert!(inst.is_deleted() && inst.is_new());
        assert!(!inst.is_editing());
    }

    #[test]
    fn test_restore_flags_after_failed_delete() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.accept_save();
        let before = inst.flags();
        inst.mark_for_delete();
        inst.restore_flags(before);
        assert!(!inst.is_deleted());
        assert!(!inst.is_editing());
    }

    #[test]
    fn test_cancel_edit_reverts_values() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.set("Surname", "Smith").unwrap();
        inst.accept_save();
        inst.set("Surname", "Jones").unwrap();
        inst.cancel_edit().unwrap();
        assert_eq!(inst.get("Surname").unwrap(), Value::Text("Smith".into()));
        assert!(!inst.is_dirty());
    }

    #[test]
    fn test_after_load_counts_and_fires_hook() {
        use std::cell::Cell;
        use std::rc::Rc;
        let fired = Rc::new(Cell::new(0));
        let fired_clone = Rc::clone(&fired);
        let mut inst = EntityInstance::new(person_def()).unwrap();
        inst.set_after_load_hook(Box::new(move || {
            fired_clone.set(fired_clone.get() + 1);
        }));
        inst.after_load();
        assert_eq!(inst.after_load_count(), 1);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_hydrate_from_row() {
        let mut inst = EntityInstance::new(person_def()).unwrap();
        let row = Row::new()
            .with("PersonID", Value::Guid(Uuid::new_v4()))
            .with("Surname", "Smith")
            .with("Age", 30i64);
        inst.hydrate_from_row(&row).unwrap();
        assert!(!inst.is_new());
        assert!(!inst.is_dirty());
        assert_eq!(inst.get("Age").unwrap(), Value::Integer(30));
    }

    #[test]
    fn test_read_only_prop_rejects_set() {
        let def = Rc::new(
            ClassDef::new("Doc", "doc")
                .with_prop(PropDef::new("DocID", PropertyType::Guid))
                .with_prop(PropDef::new("CreatedBy", PropertyType::Text).read_only())
                .with_primary_key(KeyDef::surrogate("DocID")),
        );
        let mut inst = EntityInstance::new(def).unwrap();
        assert!(inst.set("CreatedBy", "x").is_err());
    }
}
