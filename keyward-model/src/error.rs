//! Model validation errors.

use crate::Family;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or validating declared managed keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A family name that is not part of the closed family set.
    #[error("unknown managed key family: {0}")]
    UnknownFamily(String),

    /// The family exists but the registry in use has no schema for it.
    #[error("managed key family {0} is not registered")]
    UnregisteredFamily(Family),

    /// A schema that does not have exactly one identity field.
    #[error("invalid {family} schema: {reason}")]
    InvalidSchema { family: Family, reason: String },

    /// Two declared blocks share the same identity within one family.
    #[error("duplicate {family} managed key name: {name}")]
    DuplicateName { family: Family, name: String },

    #[error("{family} managed key has an empty name")]
    EmptyName { family: Family },

    #[error("{family}/{name}: missing required field '{field}'")]
    MissingField {
        family: Family,
        name: String,
        field: String,
    },

    #[error("{family}/{name}: unknown field '{field}'")]
    UnknownField {
        family: Family,
        name: String,
        field: String,
    },

    /// The identity lives in `ManagedKeyBlock::name`, never in `fields`.
    #[error("{family}/{name}: identity field '{field}' must not be repeated in fields")]
    IdentityInFields {
        family: Family,
        name: String,
        field: String,
    },
}
