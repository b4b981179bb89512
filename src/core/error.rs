use thiserror::Error;

/// Error taxonomy for the persistence core.
///
/// Each kind is a distinct variant so callers can branch (retry vs. surface
/// vs. abort). Business errors additionally expose a user-facing message and
/// a developer-detail channel via [`OrmError::user_message`] and
/// [`OrmError::developer_message`]. The core never retries an error itself.
#[derive(Error, Debug)]
pub enum OrmError {
    /// Developer error: a value could not be coerced to the declared
    /// property type. The property state is left unchanged.
    #[error("Invalid value for property '{property}': '{value}' is not a valid {expected}")]
    InvalidPropertyValue {
        property: String,
        value: String,
        expected: String,
    },

    /// Developer error: missing or malformed class/property/key metadata.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Business error: the assigned value is not present in the property's
    /// lookup list.
    #[error("'{value}' is not a valid value for '{property}': not in the lookup list")]
    ValueNotInLookupList { property: String, value: String },

    /// Business error: a single-result lookup matched more than one row.
    #[error("More than one '{class_name}' matched the criteria '{criteria}' where a unique result was expected")]
    DuplicateMatch {
        class_name: String,
        criteria: String,
    },

    /// A unique or alternate key collides with another persisted row.
    #[error("A '{class_name}' already exists with the same value for key '{key}'")]
    DuplicateKey { class_name: String, key: String },

    /// Optimistic concurrency violation: the persisted row changed since
    /// this instance was loaded.
    #[error("'{class_name}' has been changed by another user since it was loaded: {detail}")]
    OptimisticConcurrency { class_name: String, detail: String },

    /// The target row no longer exists in the store.
    #[error("'{class_name}' with identity '{id}' has been deleted by another user")]
    DeletedByAnotherUser { class_name: String, id: String },

    /// Pessimistic concurrency violation: an advisory lock is already held
    /// and has not yet expired.
    #[error("Resource '{resource}' is locked by '{holder}'")]
    LockHeld { resource: String, holder: String },

    /// A prevented delete: related rows exist for a 'prevent' relationship.
    #[error("Cannot delete: {count} related object(s) exist through relationship '{relationship}'")]
    ReferentialIntegrity { relationship: String, count: usize },

    /// Generic store-execution failure (connectivity, missing table, ...).
    #[error("Store error: {0}")]
    Store(String),

    /// Criteria string could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl OrmError {
    /// True for errors written for an end user or support operator rather
    /// than for the developer.
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::ValueNotInLookupList { .. } | Self::DuplicateMatch { .. }
        )
    }

    /// User-facing message channel.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValueNotInLookupList { property, value } => {
                format!("'{value}' is not a valid choice for {property}")
            }
            Self::DuplicateMatch { class_name, .. } => {
                format!("More than one {class_name} was found where only one was expected")
            }
            Self::OptimisticConcurrency { class_name, .. } => {
                format!("The {class_name} you are editing was changed by another user")
            }
            Self::DeletedByAnotherUser { class_name, .. } => {
                format!("The {class_name} you are editing was deleted by another user")
            }
            Self::ReferentialIntegrity {
                relationship,
                count,
            } => {
                format!(
                    "This object cannot be deleted while it has {count} related {relationship} object(s)"
                )
            }
            other => other.to_string(),
        }
    }

    /// Developer-detail channel: the full technical message.
    pub fn developer_message(&self) -> String {
        self.to_string()
    }
}
