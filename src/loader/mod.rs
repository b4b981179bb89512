// ============================================================================
// Loader
// ============================================================================
//
// Resolves identities, criteria and select specifications into live entity
// instances. Every variant funnels through one resolution procedure:
// registry first (no store access, no post-load hook on a cache hit), then
// a store select, then per-row materialization with polymorphic leaf-type
// resolution driven by discriminator metadata.
//
// ============================================================================

pub mod strategy;

pub use strategy::MaterializationStrategy;

use crate::core::{OrmError, Result, Row, Value};
use crate::criteria::{Criteria, OrderCriteria};
use crate::object::{EntityInstance, SharedInstance, ValueSnapshot, row_signature};
use crate::registry::InstanceRegistry;
use crate::schema::{Cardinality, ClassDef, MappingStrategy, RelationshipDef, SchemaRegistry};
use crate::store::{DataStore, SelectQuery};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// The table an instance of `def` persists to: concrete-table classes own
/// their table; single-table and class-table hierarchies persist through
/// the hierarchy root's table.
pub fn storage_table(schema: &SchemaRegistry, def: &Rc<ClassDef>) -> Result<String> {
    match strategy::hierarchy_strategy(schema, def) {
        Some(MappingStrategy::SingleTable) | Some(MappingStrategy::ClassTable) => {
            Ok(schema.root_of(def)?.table_name.clone())
        }
        _ => Ok(def.table_name.clone()),
    }
}

/// Discriminator columns a persisted row of `def` must carry, ancestors
/// first so a shared column ends up holding the leaf's marker value.
pub fn discriminator_columns(
    schema: &SchemaRegistry,
    def: &Rc<ClassDef>,
) -> Result<Vec<(String, Value)>> {
    let mut chain = Vec::new();
    let mut current = Rc::clone(def);
    while let Some(inheritance) = current.inheritance.clone() {
        chain.push((
            inheritance.discriminator_column.clone(),
            inheritance.discriminator_value.clone(),
        ));
        current = schema.get(&inheritance.super_class)?;
    }
    chain.reverse();
    Ok(chain)
}

#[derive(Clone)]
pub struct Loader {
    store: Rc<RefCell<dyn DataStore>>,
    registry: Rc<RefCell<dyn InstanceRegistry>>,
    schema: Rc<SchemaRegistry>,
}

impl Loader {
    pub fn new(
        store: Rc<RefCell<dyn DataStore>>,
        registry: Rc<RefCell<dyn InstanceRegistry>>,
        schema: Rc<SchemaRegistry>,
    ) -> Self {
        Self {
            store,
            registry,
            schema,
        }
    }

    pub fn schema(&self) -> &Rc<SchemaRegistry> {
        &self.schema
    }

    /// Load a single instance by primary-key value.
    pub fn get_object_by_id(
        &self,
        class_name: &str,
        id: impl Into<Value>,
    ) -> Result<Option<SharedInstance>> {
        let def = self.schema.get(class_name)?;
        let key = &def.primary_key;
        if key.prop_names.len() != 1 {
            return Err(OrmError::InvalidDefinition(format!(
                "'{}' has a composite primary key; load it by criteria",
                class_name
            )));
        }
        let criteria = Criteria::eq(key.prop_names[0].clone(), id.into());
        self.get_object(class_name, &criteria)
    }

    /// Load a single instance matching the criteria.
    ///
    /// Zero rows is a valid outcome (`None`); more than one row fails with
    /// a duplicate-match business error and returns no instance.
    pub fn get_object(
        &self,
        class_name: &str,
        criteria: &Criteria,
    ) -> Result<Option<SharedInstance>> {
        let def = self.schema.get(class_name)?;
        let mut criteria = criteria.clone();
        criteria.resolve_types(&def)?;

        // Identity-resolvable criteria hit the registry first: no store
        // access, no post-load hook.
        if let Some(signature) = self.identity_signature(&def, &criteria)
            && let Some(instance) = self.registry.borrow().get(&signature)
        {
            debug!("registry hit for '{}'", signature);
            return Ok(Some(instance));
        }

        let mut matches = self.fetch(&def, Some(&criteria), None)?;
        match matches.len() {
            0 => Ok(None),
            1 => {
                let (row, leaf) = matches.remove(0);
                Ok(Some(self.materialize(&leaf, &row)?))
            }
            _ => Err(OrmError::DuplicateMatch {
                class_name: class_name.to_string(),
                criteria: criteria.to_string(),
            }),
        }
    }

    /// Load every instance matching the criteria, in the given order. An
    /// empty result set is valid.
    pub fn get_collection(
        &self,
        class_name: &str,
        criteria: Option<&Criteria>,
        order: Option<&OrderCriteria>,
    ) -> Result<Vec<SharedInstance>> {
        let def = self.schema.get(class_name)?;
        let criteria = match criteria {
            Some(c) => {
                let mut c = c.clone();
                c.resolve_types(&def)?;
                Some(c)
            }
            None => None,
        };
        let matches = self.fetch(&def, criteria.as_ref(), order)?;
        let mut instances = Vec::with_capacity(matches.len());
        for (row, leaf) in &matches {
            instances.push(self.materialize(leaf, row)?);
        }
        Ok(instances)
    }

    /// Re-fetch an instance by its current identity.
    ///
    /// A dirty instance is a deliberate no-op: in-progress edits are never
    /// silently overwritten. A clean instance whose row is gone fails with
    /// the deleted-by-another-user concurrency error.
    pub fn refresh(&self, instance: &SharedInstance) -> Result<()> {
        if instance.borrow().is_dirty() {
            debug!(
                "refresh skipped for dirty instance {:?}",
                instance.borrow()
            );
            return Ok(());
        }
        let (query, class_name, id) = {
            let borrowed = instance.borrow();
            let def = borrowed.class_def();
            let table = storage_table(&self.schema, def)?;
            (
                SelectQuery::filtered(table, borrowed.identity().criteria(ValueSnapshot::Current)),
                borrowed.class_name().to_string(),
                borrowed.identity().to_string(),
            )
        };
        let rows = self.store.borrow().select(&query)?;
        match rows.first() {
            None => Err(OrmError::DeletedByAnotherUser { class_name, id }),
            Some(row) => instance.borrow_mut().hydrate_from_row(row),
        }
    }

    /// In-place hydration of an instance from the row matching `criteria`
    /// (revert-style reload). Returns false when no row matched.
    pub fn load(&self, instance: &SharedInstance, criteria: &Criteria) -> Result<bool> {
        let (table, class_name, criteria) = {
            let borrowed = instance.borrow();
            let def = borrowed.class_def();
            let mut criteria = criteria.clone();
            criteria.resolve_types(def)?;
            (
                storage_table(&self.schema, def)?,
                borrowed.class_name().to_string(),
                criteria,
            )
        };
        let rows = self
            .store
            .borrow()
            .select(&SelectQuery::filtered(table, criteria.clone()))?;
        match rows.len() {
            0 => Ok(false),
            1 => {
                instance.borrow_mut().hydrate_from_row(&rows[0])?;
                Ok(true)
            }
            _ => Err(OrmError::DuplicateMatch {
                class_name,
                criteria: criteria.to_string(),
            }),
        }
    }

    /// Navigate a named relationship from an owning instance.
    pub fn related(
        &self,
        owner: &SharedInstance,
        relationship_name: &str,
    ) -> Result<Vec<SharedInstance>> {
        let (rel, criteria) = {
            let borrowed = owner.borrow();
            let rel = borrowed
                .class_def()
                .relationship(relationship_name)
                .cloned()
                .ok_or_else(|| {
                    OrmError::InvalidDefinition(format!(
                        "Relationship '{}' is not defined on class '{}'",
                        relationship_name,
                        borrowed.class_name()
                    ))
                })?;
            let criteria = relationship_criteria(&borrowed, &rel, false)?;
            (rel, criteria)
        };
        let order = match &rel.order {
            Some(order) => Some(OrderCriteria::parse(order)?),
            None => None,
        };
        let found = self.get_collection(&rel.related_class, Some(&criteria), order.as_ref())?;
        if rel.cardinality == Cardinality::Single && found.len() > 1 {
            return Err(OrmError::DuplicateMatch {
                class_name: rel.related_class,
                criteria: criteria.to_string(),
            });
        }
        Ok(found)
    }

    /// Rows matching the criteria across every table the declared class
    /// maps to, paired with the resolved leaf class per row.
    fn fetch(
        &self,
        def: &Rc<ClassDef>,
        criteria: Option<&Criteria>,
        order: Option<&OrderCriteria>,
    ) -> Result<Vec<(Row, Rc<ClassDef>)>> {
        let strategy = strategy::for_class(&self.schema, def);
        let mut matches = Vec::new();
        for (table, context) in strategy.tables(&self.schema, def)? {
            let query = SelectQuery {
                table,
                criteria: criteria.cloned(),
                order: None,
            };
            for row in self.store.borrow().select(&query)? {
                let leaf = strategy.resolve_leaf(&self.schema, def, &context, &row)?;
                matches.push((row, leaf));
            }
        }
        // Concrete-table hierarchies merge rows from several tables, so
        // ordering is applied over the merged set.
        if let Some(order) = order {
            matches.sort_by(|a, b| order.compare_rows(&a.0, &b.0));
        }
        Ok(matches)
    }

    /// Materialize one fetched row, respecting the identity map:
    /// - a registered dirty instance is returned untouched (no refresh, no
    ///   post-load hook) so in-progress edits survive a concurrent reload;
    /// - a registered clean instance is re-hydrated in place, hook not
    ///   fired again;
    /// - an unknown row becomes a fresh instance, registered, with the
    ///   post-load hook fired exactly once.
    fn materialize(&self, leaf: &Rc<ClassDef>, row: &Row) -> Result<SharedInstance> {
        let signature = row_signature(leaf, row)?;
        if let Some(existing) = self.registry.borrow().get(&signature) {
            if existing.borrow().is_dirty() {
                debug!("returning dirty registered instance '{}' as-is", signature);
                return Ok(existing);
            }
            existing.borrow_mut().hydrate_from_row(row)?;
            return Ok(existing);
        }

        let instance = EntityInstance::new_shared(Rc::clone(leaf))?;
        instance.borrow_mut().hydrate_from_row(row)?;
        self.registry.borrow_mut().add(&instance);
        instance.borrow_mut().after_load();
        Ok(instance)
    }

    /// The registry signature the criteria resolve to, when they form a
    /// pure equality conjunction over exactly the primary-key properties.
    fn identity_signature(&self, def: &Rc<ClassDef>, criteria: &Criteria) -> Option<String> {
        if !criteria.is_equality_conjunction() {
            return None;
        }
        let leaves = criteria.leaves();
        let key = &def.primary_key;
        if leaves.len() != key.prop_names.len() {
            return None;
        }
        let mut values = Vec::with_capacity(key.prop_names.len());
        for prop_name in &key.prop_names {
            let value = leaves
                .iter()
                .find(|(prop, _, _)| *prop == prop_name.as_str())
                .map(|(_, _, value)| (*value).clone())?;
            let coerced = def
                .prop(prop_name)
                .map(|p| p.prop_type.coerce(prop_name, value.clone()))
                .transpose()
                .ok()??;
            values.push((prop_name.clone(), coerced));
        }
        if key.surrogate && values.len() == 1 {
            return Some(values[0].1.to_string());
        }
        Some(
            values
                .iter()
                .map(|(name, value)| format!("{}.{}={}", def.class_name, name, value))
                .collect::<Vec<_>>()
                .join(";"),
        )
    }
}

/// Equality criteria selecting the related rows of `rel` for this owner,
/// from the owner's current or persisted key-pair values.
pub fn relationship_criteria(
    owner: &EntityInstance,
    rel: &RelationshipDef,
    use_persisted: bool,
) -> Result<Criteria> {
    let mut criteria: Option<Criteria> = None;
    for pair in &rel.key_pairs {
        let cell = owner.cell(&pair.owner_prop)?;
        let value = if use_persisted {
            cell.persisted_value().clone()
        } else {
            cell.value().clone()
        };
        let leaf = Criteria::eq(pair.related_prop.clone(), value);
        criteria = Some(match criteria {
            Some(existing) => existing.and(leaf),
            None => leaf,
        });
    }
    criteria.ok_or_else(|| {
        OrmError::InvalidDefinition(format!(
            "Relationship '{}' has no key pairs",
            rel.name
        ))
    })
}
