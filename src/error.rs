//! Error taxonomy shared by the store, the identity provider and the response router.

use thiserror::Error;

/// Result type alias for content store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Typed outcome of a failed content store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or missing input. Shown inline with the submitted state.
    #[error("{0}")]
    Validation(String),

    /// The slug is already taken.
    #[error("{0}")]
    Conflict(String),

    /// The requester does not own the resource.
    #[error("not allowed")]
    Forbidden,

    /// Unknown post or comment.
    #[error("{0} not found")]
    NotFound(String),

    /// Backing store failure. Never shown to users.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Failure talking to the hosted identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered but refused the token or request.
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network or decoding failure.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The provider did not answer within the request deadline.
    #[error("identity provider timed out")]
    Timeout,
}
