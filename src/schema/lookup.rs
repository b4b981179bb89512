use crate::core::Value;
use std::collections::HashMap;

/// A fixed list of legal values for a lookup-backed property.
///
/// Maintains both directions: display string -> key value for assignment
/// resolution, and key value -> display string for presenting the current
/// value.
#[derive(Debug, Clone, Default)]
pub struct LookupList {
    display_to_key: HashMap<String, Value>,
    key_to_display: HashMap<Value, String>,
}

impl LookupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, display: impl Into<String>, key: impl Into<Value>) -> Self {
        self.add(display, key);
        self
    }

    pub fn add(&mut self, display: impl Into<String>, key: impl Into<Value>) {
        let display = display.into();
        let key = key.into();
        self.display_to_key.insert(display.clone(), key.clone());
        self.key_to_display.insert(key, display);
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.key_to_display.contains_key(key)
    }

    /// Reverse-index resolution: display string -> key value.
    pub fn key_for_display(&self, display: &str) -> Option<&Value> {
        self.display_to_key.get(display)
    }

    /// Key value -> display string; `None` when the key is absent from the
    /// list (absence is not an error on the display path).
    pub fn display_for_key(&self, key: &Value) -> Option<&str> {
        self.key_to_display.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.display_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display_to_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_directions() {
        let list = LookupList::new().with("Male", 1i64).with("Female", 2i64);
        assert_eq!(list.key_for_display("Female"), Some(&Value::Integer(2)));
        assert_eq!(list.display_for_key(&Value::Integer(1)), Some("Male"));
        assert!(list.contains_key(&Value::Integer(2)));
        assert!(!list.contains_key(&Value::Integer(3)));
    }
}
