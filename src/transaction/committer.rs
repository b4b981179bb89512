use super::unit::{BusinessObjectUnit, DereferenceUnit, Operation, TransactionUnit};
use crate::core::{OrmError, Result};
use crate::loader::{Loader, relationship_criteria, storage_table};
use crate::object::{SharedInstance, row_signature};
use crate::registry::InstanceRegistry;
use crate::schema::{DeleteAction, SchemaRegistry};
use crate::store::{DataStore, SelectQuery};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

/// Commits an ordered set of transaction units as one atomic store
/// transaction.
///
/// Before anything executes, every enlisted delete is expanded through its
/// class's relationship delete actions: prevented deletes fail the whole
/// commit up front, cascaded children enlist their own delete units ahead
/// of the owner, and dereferenced children enlist foreign-key-clearing
/// updates. Expansion walks a worklist with a visited set keyed by identity
/// signature, so cyclic relationship graphs terminate and each instance is
/// slated at most once.
///
/// On any unit failure the store transaction rolls back, every unit's
/// in-memory state is restored, and the first error is returned. Only after
/// the store commit succeeds does each unit apply its post-commit state
/// transition and registry bookkeeping.
pub struct TransactionCommitter {
    store: Rc<RefCell<dyn DataStore>>,
    registry: Rc<RefCell<dyn InstanceRegistry>>,
    schema: Rc<SchemaRegistry>,
    units: Vec<Box<dyn TransactionUnit>>,
}

impl TransactionCommitter {
    pub fn new(
        store: Rc<RefCell<dyn DataStore>>,
        registry: Rc<RefCell<dyn InstanceRegistry>>,
        schema: Rc<SchemaRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            schema,
            units: Vec::new(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Enlist an instance, deriving the operation from its lifecycle state:
    /// marked-for-delete enlists a delete, new enlists an insert, dirty
    /// persisted enlists an update. A clean persisted instance enlists
    /// nothing.
    pub fn add_business_object(&mut self, instance: &SharedInstance) -> Result<()> {
        let (flags, dirty) = {
            let borrowed = instance.borrow();
            (borrowed.flags(), borrowed.is_dirty())
        };
        let operation = if flags.is_deleted {
            if flags.is_new {
                // Never persisted, nothing to remove.
                debug!("skipping delete of never-persisted instance");
                return Ok(());
            }
            Operation::Delete
        } else if flags.is_new {
            Operation::Insert
        } else if dirty {
            Operation::Update
        } else {
            debug!("skipping clean instance {:?}", instance.borrow());
            return Ok(());
        };
        self.units
            .push(Box::new(BusinessObjectUnit::new(instance.clone(), operation)));
        Ok(())
    }

    /// Enlist a custom unit.
    pub fn add_transaction(&mut self, unit: Box<dyn TransactionUnit>) {
        self.units.push(unit);
    }

    /// Execute every enlisted unit atomically.
    pub fn commit(&mut self) -> Result<()> {
        if let Err(err) = self.expand_deletes() {
            // Expansion failed before the store transaction opened; restore
            // the enlisted instances' in-memory state.
            self.roll_back_units();
            return Err(err);
        }
        if self.units.is_empty() {
            debug!("commit with no units is a no-op");
            return Ok(());
        }
        info!("committing {} transaction unit(s)", self.units.len());

        let begin_result = self.store.borrow_mut().begin_transaction();
        if let Err(err) = begin_result {
            self.roll_back_units();
            return Err(err);
        }
        for index in 0..self.units.len() {
            let result = {
                let mut store = self.store.borrow_mut();
                self.units[index].execute(&mut *store, &self.schema)
            };
            if let Err(err) = result {
                warn!(
                    "unit '{}' failed, rolling back: {}",
                    self.units[index].describe(),
                    err
                );
                // The originating error is what the caller needs; rollback
                // failures are logged, not propagated.
                if let Err(rollback_err) = self.store.borrow_mut().rollback_transaction() {
                    warn!("store rollback failed: {}", rollback_err);
                }
                self.roll_back_units();
                return Err(err);
            }
        }
        self.store.borrow_mut().commit_transaction()?;

        {
            let mut registry = self.registry.borrow_mut();
            for unit in self.units.iter_mut() {
                unit.committed(&mut *registry)?;
            }
        }
        info!("commit complete");
        self.units.clear();
        Ok(())
    }

    /// Expand enlisted deletes through relationship delete actions, before
    /// the store transaction opens.
    fn expand_deletes(&mut self) -> Result<()> {
        let loader = Loader::new(
            Rc::clone(&self.store),
            Rc::clone(&self.registry),
            Rc::clone(&self.schema),
        );

        let mut worklist: VecDeque<SharedInstance> = VecDeque::new();
        let mut slated: HashSet<String> = HashSet::new();
        // An instance enlisted for deletion more than once keeps only its
        // first unit; a second delete of the same row would trip the
        // concurrency check mid-transaction.
        self.units.retain(|unit| {
            let Some(target) = unit.delete_target() else {
                return true;
            };
            if slated.insert(target.borrow().identity().key_signature()) {
                worklist.push_back(target);
                true
            } else {
                debug!("dropping duplicate delete unit '{}'", unit.describe());
                false
            }
        });

        while let Some(owner) = worklist.pop_front() {
            let relationships = owner.borrow().class_def().relationships.clone();
            for rel in relationships {
                match rel.delete_action {
                    DeleteAction::DoNothing => {}
                    DeleteAction::Prevent => {
                        let count = self.count_unslated_related(&owner, &rel, &slated)?;
                        if count > 0 {
                            return Err(OrmError::ReferentialIntegrity {
                                relationship: rel.name.clone(),
                                count,
                            });
                        }
                    }
                    DeleteAction::Cascade => {
                        let criteria = relationship_criteria(&owner.borrow(), &rel, true)?;
                        let children =
                            loader.get_collection(&rel.related_class, Some(&criteria), None)?;
                        let mut child_units: Vec<Box<dyn TransactionUnit>> = Vec::new();
                        for child in children {
                            let signature = child.borrow().identity().key_signature();
                            if !slated.insert(signature) {
                                continue;
                            }
                            // Capture pre-delete flags before marking, so a
                            // failed commit restores the child untouched.
                            let unit = BusinessObjectUnit::new(child.clone(), Operation::Delete);
                            child.borrow_mut().mark_for_delete();
                            child_units.push(Box::new(unit));
                            worklist.push_back(child);
                        }
                        self.insert_before_delete_of(&owner, child_units);
                    }
                    DeleteAction::Dereference => {
                        let criteria = relationship_criteria(&owner.borrow(), &rel, true)?;
                        let children =
                            loader.get_collection(&rel.related_class, Some(&criteria), None)?;
                        let fk_props: Vec<String> = rel
                            .key_pairs
                            .iter()
                            .map(|pair| pair.related_prop.clone())
                            .collect();
                        let mut child_units: Vec<Box<dyn TransactionUnit>> = Vec::new();
                        for child in children {
                            child_units.push(Box::new(DereferenceUnit::new(child, &fk_props)?));
                        }
                        self.insert_before_delete_of(&owner, child_units);
                    }
                }
            }
        }
        Ok(())
    }

    /// Restore every unit's in-memory state after a failed commit. Unit
    /// rollbacks run unconditionally so one failure cannot skip the rest.
    fn roll_back_units(&mut self) {
        for unit in self.units.iter_mut() {
            if let Err(rollback_err) = unit.roll_back() {
                warn!("unit '{}' rollback failed: {}", unit.describe(), rollback_err);
            }
        }
    }

    /// Related rows that exist in the store and are not themselves slated
    /// for deletion in this transaction.
    fn count_unslated_related(
        &self,
        owner: &SharedInstance,
        rel: &crate::schema::RelationshipDef,
        slated: &HashSet<String>,
    ) -> Result<usize> {
        let related_def = self.schema.get(&rel.related_class)?;
        let table = storage_table(&self.schema, &related_def)?;
        let mut criteria = relationship_criteria(&owner.borrow(), rel, true)?;
        criteria.resolve_types(&related_def)?;
        let rows = self
            .store
            .borrow()
            .select(&SelectQuery::filtered(table, criteria))?;
        let mut count = 0;
        for row in &rows {
            if !slated.contains(&row_signature(&related_def, row)?) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Children must be handled before their owner's delete executes.
    fn insert_before_delete_of(
        &mut self,
        owner: &SharedInstance,
        child_units: Vec<Box<dyn TransactionUnit>>,
    ) {
        let position = self
            .units
            .iter()
            .position(|unit| {
                unit.delete_target()
                    .is_some_and(|target| Rc::ptr_eq(&target, owner))
            })
            .unwrap_or(self.units.len());
        for (offset, unit) in child_units.into_iter().enumerate() {
            self.units.insert(position + offset, unit);
        }
    }
}
