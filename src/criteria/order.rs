use crate::core::{OrmError, Result, Row};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderField {
    pub prop: String,
    pub ascending: bool,
}

/// Ordering specification for collection loads: one or more properties,
/// each ascending or descending.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderCriteria {
    pub fields: Vec<OrderField>,
}

impl OrderCriteria {
    pub fn by(prop: impl Into<String>) -> Self {
        Self {
            fields: vec![OrderField {
                prop: prop.into(),
                ascending: true,
            }],
        }
    }

    pub fn then_by(mut self, prop: impl Into<String>) -> Self {
        self.fields.push(OrderField {
            prop: prop.into(),
            ascending: true,
        });
        self
    }

    pub fn then_by_descending(mut self, prop: impl Into<String>) -> Self {
        self.fields.push(OrderField {
            prop: prop.into(),
            ascending: false,
        });
        self
    }

    /// Parse `"Surname, Age DESC"` form: comma-separated fields with an
    /// optional ASC/DESC suffix.
    pub fn parse(input: &str) -> Result<Self> {
        let mut fields = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(OrmError::Parse(format!("Empty order field in '{}'", input)));
            }
            let mut tokens = part.split_whitespace();
            let prop = tokens.next().unwrap().to_string();
            let ascending = match tokens.next().map(str::to_ascii_uppercase) {
                None => true,
                Some(dir) if dir == "ASC" => true,
                Some(dir) if dir == "DESC" => false,
                Some(dir) => {
                    return Err(OrmError::Parse(format!(
                        "Unknown order direction '{}' in '{}'",
                        dir, input
                    )));
                }
            };
            fields.push(OrderField { prop, ascending });
        }
        Ok(Self { fields })
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        for field in &self.fields {
            let ordering = a
                .get_or_null(&field.prop)
                .compare(&b.get_or_null(&field.prop))
                .unwrap_or(Ordering::Equal);
            let ordering = if field.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn sort_rows(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| self.compare_rows(a, b));
    }
}

impl fmt::Display for OrderCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                if field.ascending {
                    field.prop.clone()
                } else {
                    format!("{} DESC", field.prop)
                }
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
