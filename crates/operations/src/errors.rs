//! Errors surfaced by the operation lifecycle.

use thiserror::Error;

use crate::{
    backend::BackendError,
    model::{OperationId, UnknownStatus},
};

/// Result alias for lifecycle operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// Failures of the operation lifecycle.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The caller's input is malformed.
    #[error("{message}")]
    Validation {
        /// Human-readable reason.
        message: String,

        /// The offending input field, when attributable to one.
        field: Option<String>,
    },

    /// No credentials were presented.
    #[error("{0}")]
    Authentication(String),

    /// Credentials were presented but do not grant access.
    #[error("{0}")]
    Authorization(String),

    /// No operation is tracked under this identifier.
    #[error("operation '{0}' not found")]
    NotFound(OperationId),

    /// The compute backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The compute backend reported a status this gateway does not understand.
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),

    /// The backend handed out an identifier that is already tracked.
    #[error("operation '{0}' is already tracked")]
    DuplicateId(OperationId),
}

impl OperationError {
    /// Builds a [`OperationError::Validation`].
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }
}
