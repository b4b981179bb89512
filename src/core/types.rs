use super::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw row exchanged with the store: column name -> value.
///
/// Rows are property-column keyed rather than positional so loaders and
/// transaction units can address columns by name without consulting a
/// column-order schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment, mainly for fixtures and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// The column's value, or `Null` when the column is absent.
    pub fn get_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn merge(&mut self, other: &Row) {
        for (column, value) in other.iter() {
            self.values.insert(column.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_or_null() {
        let row = Row::new().with("Surname", "Smith");
        assert_eq!(row.get_or_null("Surname"), Value::Text("Smith".into()));
        assert_eq!(row.get_or_null("Missing"), Value::Null);
    }

    #[test]
    fn test_row_merge_overwrites() {
        let mut a = Row::new().with("A", 1i64).with("B", 2i64);
        let b = Row::new().with("B", 3i64);
        a.merge(&b);
        assert_eq!(a.get_or_null("B"), Value::Integer(3));
        assert_eq!(a.len(), 2);
    }
}
