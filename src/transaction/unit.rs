use crate::core::{OrmError, Result, Row, Value};
use crate::criteria::Criteria;
use crate::loader::{discriminator_columns, storage_table};
use crate::object::{LifecycleFlags, SharedInstance, ValueSnapshot};
use crate::registry::InstanceRegistry;
use crate::schema::{KeyDef, SchemaRegistry};
use crate::store::{DataStore, SelectQuery, StoreCommand};
use log::debug;

/// One atomic participant in a committed transaction.
///
/// Units execute in the order they were enlisted, inside one store
/// transaction. `roll_back` restores any in-memory state the unit touched
/// before execution; `committed` applies the post-commit state transition
/// and registry bookkeeping. Both must be safe to call whether or not
/// `execute` ran.
pub trait TransactionUnit {
    fn describe(&self) -> String;

    fn execute(&mut self, store: &mut dyn DataStore, schema: &SchemaRegistry) -> Result<()>;

    fn roll_back(&mut self) -> Result<()>;

    fn committed(&mut self, registry: &mut dyn InstanceRegistry) -> Result<()>;

    /// The instance slated for deletion by this unit, when it is a delete.
    fn delete_target(&self) -> Option<SharedInstance> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// The standard unit persisting one entity instance.
///
/// Captures the instance's lifecycle flags and registry key at enlistment
/// time, so a failed transaction can restore the flags and a committed key
/// change can re-home the registry entry.
pub struct BusinessObjectUnit {
    instance: SharedInstance,
    operation: Operation,
    pre_flags: LifecycleFlags,
    pre_key: String,
}

impl BusinessObjectUnit {
    pub fn new(instance: SharedInstance, operation: Operation) -> Self {
        let (pre_flags, pre_key) = {
            let borrowed = instance.borrow();
            (borrowed.flags(), borrowed.identity().key_signature())
        };
        Self {
            instance,
            operation,
            pre_flags,
            pre_key,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn instance(&self) -> &SharedInstance {
        &self.instance
    }

    /// Reject the write when another persisted row already carries one of
    /// this instance's unique keys. The natural primary key and every
    /// alternate key are checked; a key with any null constituent is
    /// exempt. On update, the instance's own persisted row is not a
    /// collision.
    fn check_duplicate_keys(&self, store: &mut dyn DataStore, schema: &SchemaRegistry) -> Result<()> {
        let borrowed = self.instance.borrow();
        let def = borrowed.class_def();
        let table = storage_table(schema, def)?;

        let mut keys: Vec<&KeyDef> = Vec::new();
        if !def.primary_key.surrogate {
            keys.push(&def.primary_key);
        }
        keys.extend(def.alternate_keys.iter());

        for key in keys {
            let mut criteria: Option<Criteria> = None;
            let mut has_null = false;
            for prop_name in &key.prop_names {
                let value = borrowed.cell(prop_name)?.value().clone();
                if value.is_null() {
                    has_null = true;
                    break;
                }
                let leaf = Criteria::eq(prop_name.clone(), value);
                criteria = Some(match criteria {
                    Some(existing) => existing.and(leaf),
                    None => leaf,
                });
            }
            let Some(criteria) = criteria else { continue };
            if has_null {
                continue;
            }

            let rows = store.select(&SelectQuery::filtered(table.clone(), criteria))?;
            let collisions = match self.operation {
                Operation::Insert => rows.len(),
                _ => {
                    // Our own persisted row is not a collision.
                    let own = borrowed.identity().criteria(ValueSnapshot::Persisted);
                    let mut count = 0;
                    for row in &rows {
                        if !own.matches_row(row)? {
                            count += 1;
                        }
                    }
                    count
                }
            };
            if collisions > 0 {
                return Err(OrmError::DuplicateKey {
                    class_name: def.class_name.clone(),
                    key: key.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reject the update or delete when the persisted row has been changed
    /// or removed since this instance loaded its persisted snapshot.
    fn check_concurrency(&self, store: &mut dyn DataStore, schema: &SchemaRegistry) -> Result<()> {
        let borrowed = self.instance.borrow();
        let def = borrowed.class_def();
        let table = storage_table(schema, def)?;
        let criteria = borrowed.identity().criteria(ValueSnapshot::Persisted);
        let rows = store.select(&SelectQuery::filtered(table, criteria))?;
        let Some(row) = rows.first() else {
            return Err(OrmError::DeletedByAnotherUser {
                class_name: def.class_name.clone(),
                id: borrowed.identity().to_string(),
            });
        };
        let persisted = borrowed.persisted_row();
        for (name, value) in persisted.iter() {
            if &row.get_or_null(name) != value {
                return Err(OrmError::OptimisticConcurrency {
                    class_name: def.class_name.clone(),
                    detail: format!("property '{}' no longer matches the loaded value", name),
                });
            }
        }
        Ok(())
    }

    fn insert_row(&self, schema: &SchemaRegistry) -> Result<Row> {
        let borrowed = self.instance.borrow();
        let mut row = borrowed.current_row();
        for (column, value) in discriminator_columns(schema, borrowed.class_def())? {
            row.set(column, value);
        }
        Ok(row)
    }
}

impl TransactionUnit for BusinessObjectUnit {
    fn describe(&self) -> String {
        format!(
            "{:?} {} '{}'",
            self.operation,
            self.instance.borrow().class_name(),
            self.pre_key
        )
    }

    fn execute(&mut self, store: &mut dyn DataStore, schema: &SchemaRegistry) -> Result<()> {
        debug!("executing unit: {}", self.describe());
        match self.operation {
            Operation::Insert => {
                self.check_duplicate_keys(store, schema)?;
                let row = self.insert_row(schema)?;
                let table = storage_table(schema, self.instance.borrow().class_def())?;
                store.execute(&StoreCommand::Insert { table, row })?;
            }
            Operation::Update => {
                self.check_concurrency(store, schema)?;
                self.check_duplicate_keys(store, schema)?;
                let (table, criteria, values) = {
                    let borrowed = self.instance.borrow();
                    (
                        storage_table(schema, borrowed.class_def())?,
                        borrowed.identity().criteria(ValueSnapshot::Persisted),
                        borrowed.current_row(),
                    )
                };
                store.execute(&StoreCommand::Update {
                    table,
                    criteria,
                    values,
                })?;
            }
            Operation::Delete => {
                self.check_concurrency(store, schema)?;
                let (table, criteria) = {
                    let borrowed = self.instance.borrow();
                    (
                        storage_table(schema, borrowed.class_def())?,
                        borrowed.identity().criteria(ValueSnapshot::Persisted),
                    )
                };
                store.execute(&StoreCommand::Delete { table, criteria })?;
            }
        }
        Ok(())
    }

    fn roll_back(&mut self) -> Result<()> {
        self.instance.borrow_mut().restore_flags(self.pre_flags);
        Ok(())
    }

    fn committed(&mut self, registry: &mut dyn InstanceRegistry) -> Result<()> {
        match self.operation {
            Operation::Insert => {
                self.instance.borrow_mut().accept_save();
                registry.add(&self.instance);
            }
            Operation::Update => {
                self.instance.borrow_mut().accept_save();
                let new_key = self.instance.borrow().identity().key_signature();
                if new_key != self.pre_key {
                    registry.rekey(&self.pre_key, &self.instance);
                }
            }
            Operation::Delete => {
                self.instance.borrow_mut().accept_delete();
                registry.remove_key(&self.pre_key);
            }
        }
        Ok(())
    }

    fn delete_target(&self) -> Option<SharedInstance> {
        if self.operation == Operation::Delete {
            Some(self.instance.clone())
        } else {
            None
        }
    }
}

/// A foreign-key-clearing update enlisted when a relationship dereferences
/// its children on owner delete.
///
/// Remembers the values it overwrites so a failed commit restores the
/// child instance exactly; the flag restore alone would leave the nulled
/// foreign keys behind.
pub struct DereferenceUnit {
    inner: BusinessObjectUnit,
    overwritten: Vec<(String, Value)>,
}

impl DereferenceUnit {
    pub fn new(child: SharedInstance, fk_props: &[String]) -> Result<Self> {
        let mut overwritten = Vec::with_capacity(fk_props.len());
        for prop in fk_props {
            overwritten.push((prop.clone(), child.borrow().cell(prop)?.value().clone()));
        }
        // Capture flags and key before touching the cells.
        let inner = BusinessObjectUnit::new(child.clone(), Operation::Update);
        for prop in fk_props {
            child.borrow_mut().set(prop, Value::Null)?;
        }
        Ok(Self { inner, overwritten })
    }
}

impl TransactionUnit for DereferenceUnit {
    fn describe(&self) -> String {
        format!("{} (dereference)", self.inner.describe())
    }

    fn execute(&mut self, store: &mut dyn DataStore, schema: &SchemaRegistry) -> Result<()> {
        self.inner.execute(store, schema)
    }

    fn roll_back(&mut self) -> Result<()> {
        for (prop, value) in &self.overwritten {
            self.inner
                .instance()
                .borrow_mut()
                .set(prop, value.clone())?;
        }
        self.inner.roll_back()
    }

    fn committed(&mut self, registry: &mut dyn InstanceRegistry) -> Result<()> {
        self.inner.committed(registry)
    }
}

/// A custom unit carrying raw store commands, for work that must commit
/// atomically alongside business objects without being one.
pub struct StoreActionUnit {
    description: String,
    commands: Vec<StoreCommand>,
}

impl StoreActionUnit {
    pub fn new(description: impl Into<String>, commands: Vec<StoreCommand>) -> Self {
        Self {
            description: description.into(),
            commands,
        }
    }
}

impl TransactionUnit for StoreActionUnit {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&mut self, store: &mut dyn DataStore, _schema: &SchemaRegistry) -> Result<()> {
        for command in &self.commands {
            store.execute(command)?;
        }
        Ok(())
    }

    fn roll_back(&mut self) -> Result<()> {
        Ok(())
    }

    fn committed(&mut self, _registry: &mut dyn InstanceRegistry) -> Result<()> {
        Ok(())
    }
}
