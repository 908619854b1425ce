//! Listing error types.

use thiserror::Error;

/// Errors raised while building, authorizing, or executing a listing.
#[derive(Debug, Error)]
pub enum ListingError {
    /// A referenced entity does not exist.
    #[error("{field}: {message}")]
    NotFound {
        field: &'static str,
        message: String,
    },

    /// Unparseable input or a filter combination the kind cannot express.
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// The authorization collaborator refused access to the container.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ListingError {
    pub fn not_found(field: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            field,
            message: message.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Name of the offending filter field, when the error has one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { field, .. } | Self::InvalidArgument { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type alias using ListingError.
pub type ListingResult<T> = Result<T, ListingError>;
