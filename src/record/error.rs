//! Error types for record extraction.

use thiserror::Error;

/// Errors that can occur while turning a page into a [`Record`](super::Record).
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page has no body container; the format is not a library item.
    #[error("page has no body container")]
    MissingBody,

    /// The page has a body but no title header.
    #[error("page has no title header")]
    MissingHeader,

    /// A CSS selector failed to compile.
    #[error("invalid selector `{css}`")]
    Selector {
        /// The selector source.
        css: &'static str,
    },
}
