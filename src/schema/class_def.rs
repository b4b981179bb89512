use super::inheritance::InheritanceDef;
use super::lookup::LookupList;
use super::relationship::RelationshipDef;
use crate::core::{OrmError, Result, Value};
use std::fmt;
use std::rc::Rc;

/// Declared type of one property slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Text,
    Integer,
    Float,
    Boolean,
    Guid,
    DateTime,
}

impl PropertyType {
    /// Coerce `value` to this declared type.
    ///
    /// The special-case rules here are contractual:
    /// - the database-null sentinel always normalizes to `Null`;
    /// - an empty (zero) GUID assigned to a GUID property normalizes to
    ///   `Null`, never stored as the zero value;
    /// - text properties convert any value via its display form, with the
    ///   empty string normalizing to `Null`;
    /// - integer properties accept floats only when they round losslessly
    ///   into range; out-of-range values are rejected, never truncated.
    ///
    /// A failed coercion returns a typed developer error naming the
    /// property, the attempted value and the expected type; the caller's
    /// state is never mutated on failure.
    pub fn coerce(&self, property: &str, value: Value) -> Result<Value> {
        if matches!(value, Value::DbNull | Value::Null) {
            return Ok(Value::Null);
        }
        let reject = |value: &Value| OrmError::InvalidPropertyValue {
            property: property.to_string(),
            value: value.to_string(),
            expected: self.to_string(),
        };
        match self {
            Self::Text => {
                let text = value.to_string();
                if text.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Text(text))
                }
            }
            Self::Integer => match &value {
                Value::Integer(_) => Ok(value),
                Value::Float(f) => {
                    if f.is_finite()
                        && f.fract() == 0.0
                        && *f >= i64::MIN as f64
                        && *f <= i64::MAX as f64
                    {
                        Ok(Value::Integer(*f as i64))
                    } else {
                        Err(reject(&value))
                    }
                }
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| reject(&value)),
                _ => Err(reject(&value)),
            },
            Self::Float => match &value {
                Value::Float(_) => Ok(value),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| reject(&value)),
                _ => Err(reject(&value)),
            },
            Self::Boolean => match &value {
                Value::Boolean(_) => Ok(value),
                Value::Integer(0) => Ok(Value::Boolean(false)),
                Value::Integer(1) => Ok(Value::Boolean(true)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Boolean(true)),
                    "false" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(reject(&value)),
                },
                _ => Err(reject(&value)),
            },
            Self::Guid => match &value {
                Value::Guid(g) => {
                    if g.is_nil() {
                        Ok(Value::Null)
                    } else {
                        Ok(value)
                    }
                }
                Value::Text(s) => {
                    if s.is_empty() {
                        return Ok(Value::Null);
                    }
                    match uuid::Uuid::parse_str(s) {
                        Ok(g) if g.is_nil() => Ok(Value::Null),
                        Ok(g) => Ok(Value::Guid(g)),
                        Err(_) => Err(reject(&value)),
                    }
                }
                _ => Err(reject(&value)),
            },
            Self::DateTime => match &value {
                Value::DateTime(_) => Ok(value),
                Value::Text(s) => {
                    chrono::NaiveDateTime::parse_from_str(s, crate::core::DATE_FORMAT)
                        .map(Value::DateTime)
                        .map_err(|_| reject(&value))
                }
                _ => Err(reject(&value)),
            },
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Guid => write!(f, "GUID"),
            Self::DateTime => write!(f, "DATETIME"),
        }
    }
}

/// Definition of one property on a class.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub name: String,
    pub prop_type: PropertyType,
    pub read_only: bool,
    pub default: Option<Value>,
    pub lookup: Option<Rc<LookupList>>,
}

impl PropDef {
    pub fn new(name: impl Into<String>, prop_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            prop_type,
            read_only: false,
            default: None,
            lookup: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_lookup(mut self, list: LookupList) -> Self {
        self.lookup = Some(Rc::new(list));
        self
    }
}

/// A primary or alternate key: an ordered set of property names.
#[derive(Debug, Clone)]
pub struct KeyDef {
    pub name: String,
    pub prop_names: Vec<String>,
    /// A surrogate key is a single generated identifier property; its
    /// identity string form is the raw value with no class/prop prefix.
    pub surrogate: bool,
}

impl KeyDef {
    pub fn surrogate(prop_name: impl Into<String>) -> Self {
        let prop_name = prop_name.into();
        Self {
            name: prop_name.clone(),
            prop_names: vec![prop_name],
            surrogate: true,
        }
    }

    pub fn natural(name: impl Into<String>, prop_names: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            prop_names: prop_names.into_iter().map(String::from).collect(),
            surrogate: false,
        }
    }
}

/// The full metadata description of one persistable class, as supplied by
/// the class-definition loading collaborator. Consumed read-only.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub class_name: String,
    pub table_name: String,
    pub props: Vec<PropDef>,
    pub primary_key: KeyDef,
    pub alternate_keys: Vec<KeyDef>,
    pub relationships: Vec<RelationshipDef>,
    pub inheritance: Option<InheritanceDef>,
    /// Abstract classes own no rows of their own under concrete-table
    /// mapping.
    pub is_abstract: bool,
}

impl ClassDef {
    pub fn new(class_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            table_name: table_name.into(),
            props: Vec::new(),
            primary_key: KeyDef::surrogate("ID"),
            alternate_keys: Vec::new(),
            relationships: Vec::new(),
            inheritance: None,
            is_abstract: false,
        }
    }

    pub fn with_prop(mut self, prop: PropDef) -> Self {
        self.props.push(prop);
        self
    }

    pub fn with_primary_key(mut self, key: KeyDef) -> Self {
        self.primary_key = key;
        self
    }

    pub fn with_alternate_key(mut self, key: KeyDef) -> Self {
        self.alternate_keys.push(key);
        self
    }

    pub fn with_relationship(mut self, rel: RelationshipDef) -> Self {
        self.relationships.push(rel);
        self
    }

    pub fn with_inheritance(mut self, inheritance: InheritanceDef) -> Self {
        self.inheritance = Some(inheritance);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn prop(&self, name: &str) -> Option<&PropDef> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn require_prop(&self, name: &str) -> Result<&PropDef> {
        self.prop(name).ok_or_else(|| {
            OrmError::InvalidDefinition(format!(
                "Property '{}' is not defined on class '{}'",
                name, self.class_name
            ))
        })
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn is_key_prop(&self, name: &str) -> bool {
        self.primary_key.prop_names.iter().any(|p| p == name)
    }

    pub fn super_class(&self) -> Option<&str> {
        self.inheritance.as_ref().map(|i| i.super_class.as_str())
    }
}
