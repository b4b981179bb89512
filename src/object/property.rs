use crate::core::{OrmError, Result, Value};
use crate::schema::{LookupList, PropDef, PropertyType};
use std::rc::Rc;

/// One typed attribute slot on an entity instance.
///
/// Holds the current value, the value at last successful commit, and a
/// business-rule validity flag. Coercion failures are signaled as errors,
/// never stored: a failed assignment leaves the cell's value and validity
/// untouched.
#[derive(Debug, Clone)]
pub struct PropertyCell {
    name: String,
    prop_type: PropertyType,
    current: Value,
    persisted: Value,
    valid: bool,
    invalid_reason: Option<String>,
    lookup: Option<Rc<LookupList>>,
}

impl PropertyCell {
    pub fn from_def(def: &PropDef) -> Self {
        Self {
            name: def.name.clone(),
            prop_type: def.prop_type,
            current: Value::Null,
            persisted: Value::Null,
            valid: true,
            invalid_reason: None,
            lookup: def.lookup.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prop_type(&self) -> PropertyType {
        self.prop_type
    }

    pub fn value(&self) -> &Value {
        &self.current
    }

    pub fn persisted_value(&self) -> &Value {
        &self.persisted
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.persisted
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid_reason.as_deref()
    }

    /// Flag a business-rule violation (distinct from coercion failure,
    /// which is a usage error and never flips validity).
    pub fn set_invalid(&mut self, reason: impl Into<String>) {
        self.valid = false;
        self.invalid_reason = Some(reason.into());
    }

    pub fn clear_invalid(&mut self) {
        self.valid = true;
        self.invalid_reason = None;
    }

    /// Hydrate from the store or apply a schema default: sets current AND
    /// persisted atomically, without marking the cell dirty.
    pub fn initialise(&mut self, value: Value) -> Result<()> {
        let coerced = self.coerce(value)?;
        self.current = coerced.clone();
        self.persisted = coerced;
        Ok(())
    }

    /// Assign a new value. On success only the current value moves, which
    /// is how dirtiness is detected. On failure the cell is unchanged and
    /// still valid.
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        let coerced = self.coerce(value)?;
        self.current = coerced;
        Ok(())
    }

    /// Accept the current value as persisted (commit).
    pub fn back_up(&mut self) {
        self.persisted = self.current.clone();
    }

    /// Revert the current value to the last persisted one.
    pub fn restore(&mut self) {
        self.current = self.persisted.clone();
    }

    /// Resolve the current key value through the lookup list's reverse
    /// index. `None` (not an error) when the cell has no lookup or the
    /// value is absent from the list.
    pub fn value_to_display(&self) -> Option<&str> {
        self.lookup.as_ref()?.display_for_key(&self.current)
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        let Some(lookup) = &self.lookup else {
            return self.prop_type.coerce(&self.name, value);
        };
        if value.is_null() {
            return Ok(Value::Null);
        }
        // Lookup-backed resolution, in precedence order:
        //   1. an already-typed key value present in the list;
        //   2. a raw key parseable to the declared type and present;
        //   3. a display-value string resolved through the reverse index.
        if let Ok(key) = self.prop_type.coerce(&self.name, value.clone())
            && lookup.contains_key(&key)
        {
            return Ok(key);
        }
        if let Value::Text(display) = &value
            && let Some(key) = lookup.key_for_display(display)
        {
            return Ok(key.clone());
        }
        Err(OrmError::ValueNotInLookupList {
            property: self.name.clone(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cell(prop_type: PropertyType) -> PropertyCell {
        PropertyCell::from_def(&PropDef::new("TestProp", prop_type))
    }

    #[test]
    fn test_initialise_sets_both_and_is_not_dirty() {
        let mut cell = cell(PropertyType::Text);
        cell.initialise(Value::Text("abc".into())).unwrap();
        assert_eq!(cell.value(), &Value::Text("abc".into()));
        assert_eq!(cell.persisted_value(), &Value::Text("abc".into()));
        assert!(!cell.is_dirty());
    }

    #[test]
    fn test_set_value_moves_current_only() {
        let mut cell = cell(PropertyType::Text);
        cell.initialise(Value::Text("abc".into())).unwrap();
        cell.set_value(Value::Text("def".into())).unwrap();
        assert!(cell.is_dirty());
        assert_eq!(cell.persisted_value(), &Value::Text("abc".into()));
        cell.back_up();
        assert!(!cell.is_dirty());
    }

    #[test]
    fn test_failed_coercion_leaves_cell_unchanged_and_valid() {
        let mut cell = cell(PropertyType::Integer);
        cell.initialise(Value::Integer(10)).unwrap();
        let err = cell.set_value(Value::Text("not a number".into())).unwrap_err();
        assert!(matches!(err, OrmError::InvalidPropertyValue { .. }));
        assert_eq!(cell.value(), &Value::Integer(10));
        assert!(cell.is_valid());
        assert!(!cell.is_dirty());
    }

    #[test]
    fn test_empty_guid_round_trips_to_null() {
        let mut cell = cell(PropertyType::Guid);
        // Direct assignment path.
        cell.set_value(Value::Guid(Uuid::nil())).unwrap();
        assert_eq!(cell.value(), &Value::Null);
        // Hydration path.
        cell.initialise(Value::Guid(Uuid::nil())).unwrap();
        assert_eq!(cell.value(), &Value::Null);
    }

    #[test]
    fn test_db_null_round_trips_to_null() {
        let mut cell = cell(PropertyType::Text);
        cell.set_value(Value::DbNull).unwrap();
        assert_eq!(cell.value(), &Value::Null);
        cell.initialise(Value::DbNull).unwrap();
        assert_eq!(cell.value(), &Value::Null);
    }

    #[test]
    fn test_restore_reverts_to_persisted() {
        let mut cell = cell(PropertyType::Text);
        cell.initialise(Value::Text("abc".into())).unwrap();
        cell.set_value(Value::Text("def".into())).unwrap();
        cell.restore();
        assert_eq!(cell.value(), &Value::Text("abc".into()));
        assert!(!cell.is_dirty());
    }

    fn lookup_cell() -> PropertyCell {
        let list = LookupList::new().with("Male", 1i64).with("Female", 2i64);
        PropertyCell::from_def(&PropDef::new("Gender", PropertyType::Integer).with_lookup(list))
    }

    #[test]
    fn test_lookup_accepts_typed_key() {
        let mut cell = lookup_cell();
        cell.set_value(Value::Integer(1)).unwrap();
        assert_eq!(cell.value(), &Value::Integer(1));
    }

    #[test]
    fn test_lookup_accepts_parseable_key() {
        let mut cell = lookup_cell();
        cell.set_value(Value::Text("2".into())).unwrap();
        assert_eq!(cell.value(), &Value::Integer(2));
    }

    #[test]
    fn test_lookup_accepts_display_value() {
        let mut cell = lookup_cell();
        cell.set_value(Value::Text("Female".into())).unwrap();
        assert_eq!(cell.value(), &Value::Integer(2));
    }

    #[test]
    fn test_lookup_rejects_unknown_value_and_retains_previous() {
        let mut cell = lookup_cell();
        cell.set_value(Value::Integer(1)).unwrap();
        let err = cell.set_value(Value::Text("Other".into())).unwrap_err();
        assert!(matches!(err, OrmError::ValueNotInLookupList { .. }));
        assert_eq!(cell.value(), &Value::Integer(1));
    }

    #[test]
    fn test_value_to_display() {
        let mut cell = lookup_cell();
        cell.set_value(Value::Integer(1)).unwrap();
        assert_eq!(cell.value_to_display(), Some("Male"));
        cell.set_value(Value::Null).unwrap();
        assert_eq!(cell.value_to_display(), None);
    }
}
