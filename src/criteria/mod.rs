// ============================================================================
// Criteria Module
// ============================================================================
//
// Structured filter trees handed to the store collaborator and evaluated
// in-memory over registered instances. Leaves compare one property against
// one value; composites combine with AND/OR. The string round-trip format is
// documented on `Display`: leaf `PropName <op> 'value'`, composite
// `(<left>) <OP> (<right>)`.
//
// ============================================================================

pub mod order;
pub mod parser;

pub use order::{OrderCriteria, OrderField};

use crate::core::{OrmError, Result, Row, Value};
use crate::schema::ClassDef;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
        }
    }

    pub fn from_symbol(symbol: &str) -> Result<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "LIKE" => Ok(Self::Like),
            other => Err(OrmError::Parse(format!("Unknown operator '{}'", other))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Leaf {
        prop: String,
        op: Operator,
        value: Value,
    },
    And(Box<Criteria>, Box<Criteria>),
    Or(Box<Criteria>, Box<Criteria>),
}

impl Criteria {
    pub fn leaf(prop: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Leaf {
            prop: prop.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(prop: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(prop, Operator::Eq, value)
    }

    pub fn and(self, other: Criteria) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Criteria) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Parse a human-readable filter string, e.g.
    /// `FirstName = 'aa' and Surname = 'abc'`.
    ///
    /// Unparenthesized chains group right-associatively: `A and B and C`
    /// parses as `A AND (B AND C)`. This is observed legacy behavior and is
    /// preserved deliberately.
    pub fn parse(input: &str) -> Result<Self> {
        parser::parse(input)
    }

    /// Evaluate against an arbitrary property source. The source returns
    /// the current value for a property name, erring on unknown names.
    pub fn matches_with(&self, get: &mut dyn FnMut(&str) -> Result<Value>) -> Result<bool> {
        match self {
            Self::Leaf { prop, op, value } => {
                let actual = get(prop)?;
                leaf_matches(&actual, *op, value)
            }
            Self::And(left, right) => Ok(left.matches_with(get)? && right.matches_with(get)?),
            Self::Or(left, right) => Ok(left.matches_with(get)? || right.matches_with(get)?),
        }
    }

    /// Evaluate against a raw store row. Absent columns read as `Null`.
    pub fn matches_row(&self, row: &Row) -> Result<bool> {
        self.matches_with(&mut |prop| Ok(row.get_or_null(prop)))
    }

    /// Coerce every leaf value to the declared type of its property, so
    /// text criteria values compare correctly against typed store rows.
    pub fn resolve_types(&mut self, class_def: &ClassDef) -> Result<()> {
        match self {
            Self::Leaf { prop, op, value } => {
                // LIKE patterns stay textual.
                if *op == Operator::Like {
                    return Ok(());
                }
                if let Some(prop_def) = class_def.prop(prop) {
                    *value = prop_def.prop_type.coerce(prop, value.clone())?;
                }
                Ok(())
            }
            Self::And(left, right) | Self::Or(left, right) => {
                left.resolve_types(class_def)?;
                right.resolve_types(class_def)
            }
        }
    }

    /// Visit every leaf.
    pub fn leaves(&self) -> Vec<(&str, Operator, &Value)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a str, Operator, &'a Value)>) {
        match self {
            Self::Leaf { prop, op, value } => out.push((prop, *op, value)),
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
        }
    }

    /// True when the tree is a pure conjunction of `=` leaves.
    pub fn is_equality_conjunction(&self) -> bool {
        match self {
            Self::Leaf { op, .. } => *op == Operator::Eq,
            Self::And(left, right) => {
                left.is_equality_conjunction() && right.is_equality_conjunction()
            }
            Self::Or(..) => false,
        }
    }
}

fn leaf_matches(actual: &Value, op: Operator, expected: &Value) -> Result<bool> {
    if op == Operator::Like {
        let text = actual.to_string();
        let pattern = expected.to_string();
        return Ok(!actual.is_null() && like_match(&text, &pattern));
    }
    // Null never satisfies an ordering comparison, only (in)equality.
    if actual.is_null() || expected.is_null() {
        let both_null = actual.is_null() && expected.is_null();
        return Ok(match op {
            Operator::Eq => both_null,
            Operator::Ne => !both_null,
            _ => false,
        });
    }
    let ordering = actual.compare(expected)?;
    Ok(match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Like => unreachable!(),
    })
}

/// Match a text against a `%`/`_` wildcard pattern.
pub fn like_match(text: &str, pattern: &str) -> bool {
    // Fast paths for patterns without wildcards or with a single edge '%'.
    if !pattern.contains('%') && !pattern.contains('_') {
        return text == pattern;
    }
    if pattern.ends_with('%')
        && !pattern[..pattern.len() - 1].contains('%')
        && !pattern.contains('_')
    {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }
    if pattern.starts_with('%') && !pattern[1..].contains('%') && !pattern.contains('_') {
        return text.ends_with(&pattern[1..]);
    }
    match Regex::new(&like_to_regex(pattern)) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c if ".*+?^${}()|[]\\".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf { prop, op, value } => {
                if value.is_null() {
                    write!(f, "{} {} NULL", prop, op)
                } else {
                    write!(f, "{} {} '{}'", prop, op, value)
                }
            }
            Self::And(left, right) => write!(f, "({}) AND ({})", left, right),
            Self::Or(left, right) => write!(f, "({}) OR ({})", left, right),
        }
    }
}
