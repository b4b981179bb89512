/// What happens to related objects when the owning object is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    /// Delete every related object as part of the same transaction.
    Cascade,
    /// Refuse the delete while related objects exist.
    Prevent,
    /// Null out the foreign-key properties on related objects.
    Dereference,
    /// Leave related objects untouched.
    DoNothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one related object.
    Single,
    /// A collection of related objects.
    Multiple,
}

/// One foreign-key pairing: owner property -> related-class property.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub owner_prop: String,
    pub related_prop: String,
}

/// Metadata for a named, navigable relationship between two classes.
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    pub name: String,
    pub cardinality: Cardinality,
    pub related_class: String,
    pub key_pairs: Vec<KeyPair>,
    pub delete_action: DeleteAction,
    /// Optional ordering for multiple relationships, in `OrderCriteria`
    /// string form.
    pub order: Option<String>,
}

impl RelationshipDef {
    pub fn multiple(
        name: impl Into<String>,
        related_class: impl Into<String>,
        pairs: Vec<(&str, &str)>,
        delete_action: DeleteAction,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Multiple,
            related_class: related_class.into(),
            key_pairs: pairs
                .into_iter()
                .map(|(o, r)| KeyPair {
                    owner_prop: o.to_string(),
                    related_prop: r.to_string(),
                })
                .collect(),
            delete_action,
            order: None,
        }
    }

    pub fn single(
        name: impl Into<String>,
        related_class: impl Into<String>,
        pairs: Vec<(&str, &str)>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Single,
            related_class: related_class.into(),
            key_pairs: pairs
                .into_iter()
                .map(|(o, r)| KeyPair {
                    owner_prop: o.to_string(),
                    related_prop: r.to_string(),
                })
                .collect(),
            delete_action: DeleteAction::DoNothing,
            order: None,
        }
    }

    pub fn ordered_by(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}
