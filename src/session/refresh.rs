//! Shared refresh rendezvous for expired session tokens.
//!
//! Every worker that hits an authentication failure goes through the same
//! gate. Only the first one asks the [`TokenSource`] for a new token; workers
//! queued behind it see that the token moved on since their failed attempt
//! and retry straight away. Workers that are not failing never touch the gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{SessionError, SessionHolder, SessionToken};

/// Supplies replacement session tokens (interactive prompt, fixed list, ...).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Blocks until a replacement token is available.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when no token can be produced.
    async fn next_token(&self) -> Result<SessionToken, SessionError>;
}

/// A token source backed by a fixed queue of tokens.
///
/// Used for non-interactive runs (an empty queue fails the first refresh) and
/// in tests.
#[derive(Debug, Default)]
pub struct QueuedTokens {
    tokens: Mutex<VecDeque<SessionToken>>,
    requests: AtomicUsize,
}

impl QueuedTokens {
    /// Creates a source that hands out `tokens` in order.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(SessionToken::new).collect()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Creates a source that never yields a token.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Number of times a token was requested.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for QueuedTokens {
    async fn next_token(&self) -> Result<SessionToken, SessionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(SessionError::Exhausted)
    }
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn next_token(&self) -> Result<SessionToken, SessionError> {
        (**self).next_token().await
    }
}

/// What a refresh call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller obtained and installed a new token.
    Replaced,
    /// Another worker already replaced the token this caller failed with.
    AlreadyRefreshed,
}

/// Coordinates session refreshes for all workers of a run.
pub struct SessionRefresher {
    holder: Arc<SessionHolder>,
    source: Box<dyn TokenSource>,
    gate: tokio::sync::Mutex<()>,
    refreshes: AtomicUsize,
    closed: AtomicBool,
}

impl std::fmt::Debug for SessionRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRefresher")
            .field("holder", &self.holder)
            .field("refreshes", &self.refreshes())
            .finish_non_exhaustive()
    }
}

impl SessionRefresher {
    /// Creates a refresher that installs tokens from `source` into `holder`.
    pub fn new(holder: Arc<SessionHolder>, source: impl TokenSource + 'static) -> Self {
        Self {
            holder,
            source: Box::new(source),
            gate: tokio::sync::Mutex::new(()),
            refreshes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The holder this refresher writes to.
    #[must_use]
    pub fn holder(&self) -> &Arc<SessionHolder> {
        &self.holder
    }

    /// Number of tokens installed by this refresher.
    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Makes sure the token in the holder is newer than `failed_with`.
    ///
    /// Waits behind any refresh already in progress. If the token changed
    /// while waiting, returns [`RefreshOutcome::AlreadyRefreshed`] without
    /// consulting the source. Once the source has failed, every later call
    /// fails with [`SessionError::Exhausted`] without asking it again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the source cannot supply a token.
    #[instrument(level = "debug", skip_all)]
    pub async fn refresh_after_failure(
        &self,
        failed_with: &SessionToken,
    ) -> Result<RefreshOutcome, SessionError> {
        let _guard = self.gate.lock().await;

        if self.holder.current() != *failed_with {
            return Ok(RefreshOutcome::AlreadyRefreshed);
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Exhausted);
        }

        let token = match self.source.next_token().await {
            Ok(token) if token.is_empty() => Err(SessionError::EmptyToken),
            other => other,
        };
        let token = token.inspect_err(|_| self.closed.store(true, Ordering::SeqCst))?;

        self.holder.replace(token);
        let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        info!(refreshes = count, "installed refreshed session token");
        Ok(RefreshOutcome::Replaced)
    }
}
