use crate::core::{OrmError, Result, Row, Value};
use crate::criteria::Criteria;
use crate::schema::{ClassDef, KeyDef};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Which snapshot of the identity's constituent values to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSnapshot {
    Current,
    /// The value immediately prior to the most recent change, even across
    /// repeated mutations before a commit.
    Previous,
    /// The value at the last successful commit.
    Persisted,
}

#[derive(Debug, Clone)]
struct IdentityValue {
    name: String,
    current: Value,
    previous: Value,
    persisted: Value,
}

/// The structured key naming one entity instance.
///
/// May be a single surrogate property (generated identifier) or a composite
/// of natural-key properties. Each constituent tracks current, previous and
/// persisted values so an in-flight key mutation can still be found by its
/// old key until the rename commits.
#[derive(Debug, Clone)]
pub struct Identity {
    class_name: String,
    surrogate: bool,
    values: Vec<IdentityValue>,
    has_persisted: bool,
    /// Stable projection for equality/hash: saving an instance never
    /// changes its hash. Updated only when persisted values change.
    stable_signature: String,
}

impl Identity {
    pub fn new(class_name: impl Into<String>, key: &KeyDef, initial: &[(String, Value)]) -> Self {
        let class_name = class_name.into();
        let values = key
            .prop_names
            .iter()
            .map(|name| {
                let value = initial
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null);
                IdentityValue {
                    name: name.clone(),
                    current: value.clone(),
                    previous: value.clone(),
                    persisted: value,
                }
            })
            .collect();
        let mut identity = Self {
            class_name,
            surrogate: key.surrogate,
            values,
            has_persisted: false,
            stable_signature: String::new(),
        };
        identity.stable_signature = identity.as_string(ValueSnapshot::Current);
        identity
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_surrogate(&self) -> bool {
        self.surrogate
    }

    pub fn contains(&self, prop: &str) -> bool {
        self.values.iter().any(|v| v.name == prop)
    }

    /// Rotate current -> previous, then apply the new value. Repeated sets
    /// keep `previous` at the value immediately prior to the latest change.
    pub fn set(&mut self, prop: &str, value: Value) -> Result<()> {
        let slot = self
            .values
            .iter_mut()
            .find(|v| v.name == prop)
            .ok_or_else(|| {
                OrmError::InvalidDefinition(format!(
                    "'{}' is not part of the primary key of '{}'",
                    prop, self.class_name
                ))
            })?;
        slot.previous = std::mem::replace(&mut slot.current, value);
        Ok(())
    }

    /// Hydrate from the store: sets current, previous and persisted in one
    /// step and marks the identity as persisted.
    pub fn hydrate(&mut self, prop: &str, value: Value) -> Result<()> {
        let slot = self
            .values
            .iter_mut()
            .find(|v| v.name == prop)
            .ok_or_else(|| {
                OrmError::InvalidDefinition(format!(
                    "'{}' is not part of the primary key of '{}'",
                    prop, self.class_name
                ))
            })?;
        slot.current = value.clone();
        slot.previous = value.clone();
        slot.persisted = value;
        self.has_persisted = true;
        self.stable_signature = self.as_string(ValueSnapshot::Persisted);
        Ok(())
    }

    pub fn value_of(&self, prop: &str, snapshot: ValueSnapshot) -> Option<&Value> {
        self.values.iter().find(|v| v.name == prop).map(|v| match snapshot {
            ValueSnapshot::Current => &v.current,
            ValueSnapshot::Previous => &v.previous,
            ValueSnapshot::Persisted => &v.persisted,
        })
    }

    /// Deterministic string form in key-definition order:
    /// `ClassName.Prop=Value;ClassName.Prop2=Value2`. A single-property
    /// surrogate key renders as just the raw value for backward-compatible
    /// identity comparisons.
    pub fn as_string(&self, snapshot: ValueSnapshot) -> String {
        let pick = |v: &IdentityValue| match snapshot {
            ValueSnapshot::Current => v.current.clone(),
            ValueSnapshot::Previous => v.previous.clone(),
            ValueSnapshot::Persisted => v.persisted.clone(),
        };
        if self.surrogate && self.values.len() == 1 {
            return pick(&self.values[0]).to_string();
        }
        self.values
            .iter()
            .map(|v| format!("{}.{}={}", self.class_name, v.name, pick(v)))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The raw typed value for a single-property key, or the composite
    /// string form otherwise.
    pub fn as_value(&self) -> Value {
        if self.values.len() == 1 {
            self.values[0].current.clone()
        } else {
            Value::Text(self.as_string(ValueSnapshot::Current))
        }
    }

    /// The signature used for registry keys: persisted values once the
    /// identity has been persisted, else current values — so an instance is
    /// found by its old key until a rename commits.
    pub fn key_signature(&self) -> String {
        if self.has_persisted {
            self.as_string(ValueSnapshot::Persisted)
        } else {
            self.as_string(ValueSnapshot::Current)
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.values.iter().any(|v| v.current != v.persisted)
    }

    pub fn has_persisted(&self) -> bool {
        self.has_persisted
    }

    /// Accept current values as persisted (commit).
    pub fn back_up(&mut self) {
        for slot in &mut self.values {
            slot.persisted = slot.current.clone();
        }
        self.has_persisted = true;
        self.stable_signature = self.as_string(ValueSnapshot::Persisted);
    }

    /// Equality criteria over the key properties for the chosen snapshot,
    /// used to address this instance's row in the store.
    pub fn criteria(&self, snapshot: ValueSnapshot) -> Criteria {
        let mut iter = self.values.iter();
        let first = iter.next().expect("identity has at least one property");
        let pick = |v: &IdentityValue| match snapshot {
            ValueSnapshot::Current => v.current.clone(),
            ValueSnapshot::Previous => v.previous.clone(),
            ValueSnapshot::Persisted => v.persisted.clone(),
        };
        let mut criteria = Criteria::eq(first.name.clone(), pick(first));
        for v in iter {
            criteria = criteria.and(Criteria::eq(v.name.clone(), pick(v)));
        }
        criteria
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name && self.stable_signature == other.stable_signature
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_name.hash(state);
        self.stable_signature.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string(ValueSnapshot::Current))
    }
}

/// The registry signature a raw store row would have for `class_def`,
/// without materializing an instance.
pub fn row_signature(class_def: &ClassDef, row: &Row) -> Result<String> {
    let key = &class_def.primary_key;
    if key.surrogate && key.prop_names.len() == 1 {
        let value = row.get(&key.prop_names[0]).ok_or_else(|| {
            OrmError::Store(format!(
                "Row for '{}' is missing key column '{}'",
                class_def.class_name, key.prop_names[0]
            ))
        })?;
        return Ok(value.to_string());
    }
    let parts: Result<Vec<String>> = key
        .prop_names
        .iter()
        .map(|name| {
            let value = row.get(name).ok_or_else(|| {
                OrmError::Store(format!(
                    "Row for '{}' is missing key column '{}'",
                    class_def.class_name, name
                ))
            })?;
            Ok(format!("{}.{}={}", class_def.class_name, name, value))
        })
        .collect();
    Ok(parts?.join(";"))
}
