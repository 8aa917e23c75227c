//! Error types for identifier range resolution.

use thiserror::Error;

use crate::fetch::FetchError;
use crate::session::SessionError;

/// Failures while determining the identifier range of a run.
///
/// All of them are fatal: without a range nothing can be fetched.
#[derive(Debug, Error)]
pub enum RangeError {
    /// The index listing shows the login page.
    #[error("index listing requires authentication")]
    AuthInvalid,

    /// The index listing has no recognizable item reference.
    #[error("index listing not recognized: {reason}")]
    MalformedResponse {
        /// What was missing.
        reason: &'static str,
    },

    /// The index listing could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The session could not be refreshed after an authentication failure.
    #[error("session refresh failed while reading the index: {0}")]
    Session(#[from] SessionError),
}
