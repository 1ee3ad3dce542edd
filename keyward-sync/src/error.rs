//! Error types for the reconciliation engine.

use keyward_model::{Family, ModelError};
use std::fmt;
use thiserror::Error;

/// Result type for engine and remote store operations.
pub type KeyResult<T> = Result<T, ManagedKeyError>;

/// The remote store operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    List,
    Get,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Put => "put",
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Delete => "delete",
        })
    }
}

/// Errors that can occur while reconciling or reading managed keys.
#[derive(Debug, Error)]
pub enum ManagedKeyError {
    /// A fresh resource declares a family the remote already has entries for.
    #[error(
        "{family} managed keys already exist remotely ({}); import them before declaring this family",
        .existing.join(", ")
    )]
    Collision { family: Family, existing: Vec<String> },

    /// The remote rejected the family as unknown.
    #[error("remote does not support {family} managed keys ({operation}): {detail}")]
    UnsupportedFamily {
        family: Family,
        operation: Operation,
        detail: String,
    },

    /// Network or authentication failure.
    #[error("{operation} {family}/{} failed: {detail}", .name.as_deref().unwrap_or("*"))]
    Transport {
        family: Family,
        operation: Operation,
        name: Option<String>,
        detail: String,
    },

    #[error("{family}/{name} not found")]
    NotFound { family: Family, name: String },

    /// The caller cancelled the pass before or during this operation.
    #[error("{operation} on {family} managed keys cancelled")]
    Cancelled { family: Family, operation: Operation },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ManagedKeyError {
    pub(crate) fn transport(
        family: Family,
        operation: Operation,
        name: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        ManagedKeyError::Transport {
            family,
            operation,
            name: name.map(str::to_string),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagedKeyError::NotFound { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ManagedKeyError::UnsupportedFamily { .. })
    }

    /// True when a later pass with the same inputs may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ManagedKeyError::Transport { .. } | ManagedKeyError::Cancelled { .. }
        )
    }

    /// The family the error is about, when it has one.
    pub fn family(&self) -> Option<Family> {
        match self {
            ManagedKeyError::Collision { family, .. }
            | ManagedKeyError::UnsupportedFamily { family, .. }
            | ManagedKeyError::Transport { family, .. }
            | ManagedKeyError::NotFound { family, .. }
            | ManagedKeyError::Cancelled { family, .. } => Some(*family),
            ManagedKeyError::Model(_) | ManagedKeyError::Config(_) => None,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            ManagedKeyError::UnsupportedFamily { operation, .. }
            | ManagedKeyError::Transport { operation, .. }
            | ManagedKeyError::Cancelled { operation, .. } => Some(*operation),
            ManagedKeyError::Collision { .. } => Some(Operation::List),
            ManagedKeyError::NotFound { .. } => Some(Operation::Get),
            ManagedKeyError::Model(_) | ManagedKeyError::Config(_) => None,
        }
    }
}
