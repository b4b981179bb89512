use crate::core::{OrmError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// The single fixed format used whenever a date crosses a string boundary
/// (criteria round-trips, diagnostics, display).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    /// Database-null sentinel as handed over by data-binding layers.
    /// Normalized to `Null` at every coercion boundary.
    DbNull,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Guid(Uuid),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            // NULL handling: NULL is "greater" than all values (NULL LAST)
            (a, b) if a.is_null() && b.is_null() => Ok(Ordering::Equal),
            (a, _) if a.is_null() => Ok(Ordering::Greater),
            (_, b) if b.is_null() => Ok(Ordering::Less),

            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),

            (Value::Float(a), Value::Float(b)) => {
                // NaN is considered equal to NaN, greater than all other values
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ok(Ordering::Equal),
                    (true, false) => Ok(Ordering::Greater),
                    (false, true) => Ok(Ordering::Less),
                    (false, false) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
                }
            }

            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Ok(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),

            // Mixed numeric types (implicit coercion)
            (Value::Integer(a), Value::Float(b)) => {
                Ok((*a as f64).partial_cmp(b).unwrap_or(Ordering::Greater))
            }
            (Value::Float(a), Value::Integer(b)) => {
                Ok(a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Less))
            }

            _ => Err(OrmError::Store(format!(
                "Cannot compare incompatible types: {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::DbNull => "DBNULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Guid(_) => "GUID",
            Self::DateTime(_) => "DATETIME",
        }
    }

    /// True for both the plain null and the database-null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::DbNull)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_null() && b.is_null() => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Guid(a), Self::Guid(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            // Implicit conversion between Integer and Float
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null | Self::DbNull => 0u8.hash(state),
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Self::Guid(g) => {
                5u8.hash(state);
                g.hash(state);
            }
            Self::DateTime(d) => {
                6u8.hash(state);
                d.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::DbNull => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Guid(g) => write!(f, "{}", g),
            Self::DateTime(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Self::Guid(g)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Self::DateTime(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Integer(42), Value::Float(42.0));
        assert_ne!(Value::Integer(1), Value::Integer(2));
    }

    #[test]
    fn test_db_null_equals_null() {
        assert_eq!(Value::Null, Value::DbNull);
        assert!(Value::DbNull.is_null());
    }

    #[test]
    fn test_value_ordering() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("a".into()).compare(&Value::Text("b".into())).unwrap(),
            Ordering::Less
        );
        // NULL LAST
        assert_eq!(
            Value::Null.compare(&Value::Integer(0)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_incompatible_comparison_errors() {
        let result = Value::Boolean(true).compare(&Value::Integer(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_datetime_display_uses_fixed_format() {
        let d = NaiveDateTime::parse_from_str("2007-01-01 13:30:00", DATE_FORMAT).unwrap();
        assert_eq!(Value::DateTime(d).to_string(), "2007-01-01 13:30:00");
    }
}
