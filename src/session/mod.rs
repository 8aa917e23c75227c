//! Process-wide session token shared by every fetch worker.
//!
//! The token is the only mutable state shared across workers. Readers take a
//! cheap clone of the latest value before each request; a replace is visible
//! to every later read but does not affect requests already in flight.

mod error;
mod refresh;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

pub use error::SessionError;
pub use refresh::{QueuedTokens, RefreshOutcome, SessionRefresher, TokenSource};

/// An opaque session token value.
///
/// Cloning is an `Arc` bump. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(Arc<str>);

impl SessionToken {
    /// Wraps a raw token value as-is.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Builds a token from user input, accepting either the bare value or a
    /// `NAME=value` cookie pair for the given cookie name.
    #[must_use]
    pub fn from_input(raw: &str, cookie_name: &str) -> Self {
        let trimmed = raw.trim();
        let value = trimmed
            .strip_prefix(cookie_name)
            .and_then(|rest| rest.strip_prefix('='))
            .unwrap_or(trimmed);
        Self::new(value.trim())
    }

    /// Returns the raw token value for use in a request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when the token carries no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken")
            .field(&format_args!("<{} chars>", self.0.len()))
            .finish()
    }
}

/// Holds the current session token.
///
/// Single writer, many readers: `current` and `replace` never block on I/O and
/// never observe a partially written value.
#[derive(Debug)]
pub struct SessionHolder {
    token: RwLock<SessionToken>,
}

impl SessionHolder {
    /// Creates a holder seeded with the initial token.
    #[must_use]
    pub fn new(initial: SessionToken) -> Self {
        Self {
            token: RwLock::new(initial),
        }
    }

    /// Returns the latest installed token.
    #[must_use]
    pub fn current(&self) -> SessionToken {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs a new token for all future reads. Latest write wins.
    pub fn replace(&self, token: SessionToken) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = token;
        debug!("session token replaced");
    }
}
