//! Per-item fetch state machine.
//!
//! Each dispatched identifier moves through
//! `Pending -> Fetching -> Done(outcome)`, with the side loop
//! `Fetching -> AwaitingNewSession -> Fetching` whenever the library answers
//! with its login page. That loop has no limit and no delay: an expired
//! session is fixed by a new token, not by waiting. Unavailable and malformed
//! pages are terminal for the identifier.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{FetchError, PageSource};
use crate::record::{AUTH_REQUIRED_MARKER, ExtractError, Record, RecordParser, UNAVAILABLE_MARKER};
use crate::session::{SessionError, SessionRefresher, SessionToken};

/// Why a page was classified as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    /// The page has no body container.
    MissingBody,
    /// The body was found but extraction failed.
    Extract(String),
    /// The request failed at the transport level.
    Transport(String),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBody => write!(f, "missing body container"),
            Self::Extract(message) => write!(f, "extraction failed: {message}"),
            Self::Transport(message) => write!(f, "transport failure: {message}"),
        }
    }
}

/// Classification of a single fetch attempt or a finished item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The item was fetched and extracted.
    Fetched(Record),
    /// The library reports the item as not available.
    Unavailable,
    /// The session is not authenticated.
    AuthInvalid,
    /// The page is not in a recognized shape.
    MalformedResponse {
        /// What was wrong with it.
        reason: MalformedReason,
    },
}

impl FetchOutcome {
    /// Short label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetched(_) => "fetched",
            Self::Unavailable => "unavailable",
            Self::AuthInvalid => "auth_invalid",
            Self::MalformedResponse { .. } => "malformed",
        }
    }
}

/// Classifies a fetched item page.
///
/// Precedence: login marker, then body container (with the library's error
/// page as the unavailable case), then extraction.
#[must_use]
pub fn classify_page(id: u64, page: &str, parser: &dyn RecordParser) -> FetchOutcome {
    if page.contains(AUTH_REQUIRED_MARKER) {
        return FetchOutcome::AuthInvalid;
    }
    match parser.parse(id, page) {
        Ok(record) => FetchOutcome::Fetched(record),
        Err(ExtractError::MissingBody) if page.contains(UNAVAILABLE_MARKER) => {
            FetchOutcome::Unavailable
        }
        Err(ExtractError::MissingBody) => FetchOutcome::MalformedResponse {
            reason: MalformedReason::MissingBody,
        },
        Err(error) => FetchOutcome::MalformedResponse {
            reason: MalformedReason::Extract(error.to_string()),
        },
    }
}

#[derive(Debug)]
enum ItemState {
    Pending,
    Fetching,
    AwaitingNewSession { failed_with: SessionToken },
    Done(FetchOutcome),
}

/// Terminal result of driving one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivenItem {
    /// The terminal outcome; never [`FetchOutcome::AuthInvalid`].
    pub outcome: FetchOutcome,
    /// How many times the item was re-fetched after a session refresh.
    pub auth_retries: u32,
}

/// Drives identifiers to a terminal outcome, refreshing the session as needed.
#[derive(Clone)]
pub struct RetryCoordinator {
    source: Arc<dyn PageSource>,
    parser: Arc<dyn RecordParser>,
    refresher: Arc<SessionRefresher>,
}

impl fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("refresher", &self.refresher)
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    /// Creates a coordinator.
    pub fn new(
        source: Arc<dyn PageSource>,
        parser: Arc<dyn RecordParser>,
        refresher: Arc<SessionRefresher>,
    ) -> Self {
        Self {
            source,
            parser,
            refresher,
        }
    }

    /// The refresher shared by all items.
    #[must_use]
    pub fn refresher(&self) -> &Arc<SessionRefresher> {
        &self.refresher
    }

    /// The page source used for fetching.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }

    /// Runs the state machine for `id` until it reaches a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if a replacement token is needed but none can
    /// be obtained; the item then has no outcome.
    #[instrument(level = "debug", skip(self))]
    pub async fn drive(&self, id: u64) -> Result<DrivenItem, SessionError> {
        let mut state = ItemState::Pending;
        let mut auth_retries = 0u32;

        loop {
            state = match state {
                ItemState::Pending => ItemState::Fetching,
                ItemState::Fetching => {
                    let token = self.refresher.holder().current();
                    match self.attempt(id, &token).await {
                        FetchOutcome::AuthInvalid => {
                            debug!(id, "session rejected, awaiting new token");
                            ItemState::AwaitingNewSession { failed_with: token }
                        }
                        outcome => ItemState::Done(outcome),
                    }
                }
                ItemState::AwaitingNewSession { failed_with } => {
                    self.refresher.refresh_after_failure(&failed_with).await?;
                    auth_retries += 1;
                    ItemState::Fetching
                }
                ItemState::Done(outcome) => {
                    return Ok(DrivenItem {
                        outcome,
                        auth_retries,
                    });
                }
            };
        }
    }

    /// One request plus classification.
    async fn attempt(&self, id: u64, token: &SessionToken) -> FetchOutcome {
        match self.source.fetch_item(id, token).await {
            Ok(page) => classify_page(id, &page, self.parser.as_ref()),
            Err(error) => {
                warn!(id, error = %error, "transport failure, skipping item");
                transport_failure(&error)
            }
        }
    }
}

fn transport_failure(error: &FetchError) -> FetchOutcome {
    FetchOutcome::MalformedResponse {
        reason: MalformedReason::Transport(error.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::record::HtmlRecordParser;
    use crate::session::{QueuedTokens, SessionHolder};

    const BOOK: &str = r#"<h3 class="card-header">T</h3><div class="card-body">text</div>"#;
    const LOGIN: &str = "<p>Authorize remote access</p>";

    /// Serves `BOOK` for the token "good" and the login page otherwise.
    #[derive(Default)]
    struct TokenGatedSource {
        calls: AtomicUsize,
        overrides: Mutex<HashMap<u64, &'static str>>,
    }

    #[async_trait]
    impl PageSource for TokenGatedSource {
        async fn fetch_item(&self, id: u64, token: &SessionToken) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(page) = self.overrides.lock().unwrap().get(&id) {
                return Ok((*page).to_string());
            }
            if token.expose() == "good" {
                Ok(BOOK.to_string())
            } else {
                Ok(LOGIN.to_string())
            }
        }

        async fn fetch_index(&self, _token: &SessionToken) -> Result<String, FetchError> {
            Ok(String::new())
        }
    }

    fn coordinator(
        initial: &str,
        tokens: &[&str],
        source: Arc<TokenGatedSource>,
    ) -> RetryCoordinator {
        let holder = Arc::new(SessionHolder::new(SessionToken::new(initial)));
        let refresher = Arc::new(SessionRefresher::new(
            holder,
            QueuedTokens::new(tokens.iter().copied()),
        ));
        RetryCoordinator::new(source, Arc::new(HtmlRecordParser), refresher)
    }

    #[test]
    fn test_classify_login_page_is_auth_invalid() {
        assert_eq!(
            classify_page(1, LOGIN, &HtmlRecordParser),
            FetchOutcome::AuthInvalid
        );
    }

    #[test]
    fn test_classify_login_marker_wins_over_body() {
        let page = format!("{BOOK}{LOGIN}");
        assert_eq!(
            classify_page(1, &page, &HtmlRecordParser),
            FetchOutcome::AuthInvalid
        );
    }

    #[test]
    fn test_classify_error_page_is_unavailable() {
        let page = "<h1>Slim Application Error</h1>";
        assert_eq!(
            classify_page(1, page, &HtmlRecordParser),
            FetchOutcome::Unavailable
        );
    }

    #[test]
    fn test_classify_unknown_page_is_malformed() {
        assert_eq!(
            classify_page(1, "<p>hello</p>", &HtmlRecordParser),
            FetchOutcome::MalformedResponse {
                reason: MalformedReason::MissingBody
            }
        );
    }

    #[test]
    fn test_classify_body_without_header_is_malformed_extract() {
        let outcome = classify_page(1, r#"<div class="card-body">x</div>"#, &HtmlRecordParser);
        assert!(matches!(
            outcome,
            FetchOutcome::MalformedResponse {
                reason: MalformedReason::Extract(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_drive_success_without_retry() {
        let source = Arc::new(TokenGatedSource::default());
        let coordinator = coordinator("good", &[], Arc::clone(&source));
        let item = coordinator.drive(5).await.unwrap();
        assert!(matches!(item.outcome, FetchOutcome::Fetched(ref r) if r.id == 5));
        assert_eq!(item.auth_retries, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drive_refreshes_session_and_retries_same_item() {
        let source = Arc::new(TokenGatedSource::default());
        let coordinator = coordinator("stale", &["good"], Arc::clone(&source));
        let item = coordinator.drive(7).await.unwrap();
        assert!(matches!(item.outcome, FetchOutcome::Fetched(ref r) if r.id == 7));
        assert_eq!(item.auth_retries, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.refresher().refreshes(), 1);
    }

    #[tokio::test]
    async fn test_drive_keeps_retrying_while_tokens_are_rejected() {
        let source = Arc::new(TokenGatedSource::default());
        let coordinator = coordinator("stale", &["bad-1", "bad-2", "good"], Arc::clone(&source));
        let item = coordinator.drive(7).await.unwrap();
        assert!(matches!(item.outcome, FetchOutcome::Fetched(_)));
        assert_eq!(item.auth_retries, 3);
    }

    #[tokio::test]
    async fn test_drive_fails_when_no_token_available() {
        let source = Arc::new(TokenGatedSource::default());
        let coordinator = coordinator("stale", &[], source);
        let result = coordinator.drive(7).await;
        assert!(matches!(result, Err(SessionError::Exhausted)));
    }

    #[tokio::test]
    async fn test_drive_unavailable_is_terminal() {
        let source = Arc::new(TokenGatedSource::default());
        source
            .overrides
            .lock()
            .unwrap()
            .insert(4, "Slim Application Error");
        let coordinator = coordinator("good", &[], Arc::clone(&source));
        let item = coordinator.drive(4).await.unwrap();
        assert_eq!(item.outcome, FetchOutcome::Unavailable);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
