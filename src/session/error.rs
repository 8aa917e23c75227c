//! Error types for session token management.

use thiserror::Error;

/// Errors raised while obtaining a replacement session token.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token source has no further tokens to offer.
    #[error("no replacement session token available")]
    Exhausted,

    /// The token source produced an empty value.
    #[error("replacement session token is empty")]
    EmptyToken,

    /// The token source failed (terminal closed, read error, ...).
    #[error("session token source failed: {message}")]
    Source {
        /// Description of the underlying failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a source failure from any displayable error.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }
}
