//! Upper bound of the identifier range, read from the library index.
//!
//! The index lists items newest first, so the first item link in the listing
//! table carries the highest known identifier.

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use super::RangeError;
use crate::fetch::PageSource;
use crate::record::AUTH_REQUIRED_MARKER;
use crate::session::{SessionRefresher, SessionToken};

/// Extracts the highest known identifier from an index page.
///
/// # Errors
///
/// Returns [`RangeError::AuthInvalid`] for the login page and
/// [`RangeError::MalformedResponse`] when no item link can be found.
pub fn parse_index(page: &str) -> Result<u64, RangeError> {
    if page.contains(AUTH_REQUIRED_MARKER) {
        return Err(RangeError::AuthInvalid);
    }

    let document = Html::parse_document(page);
    let table_selector = Selector::parse("table").map_err(|_| RangeError::MalformedResponse {
        reason: "invalid table selector",
    })?;
    let anchor_selector =
        Selector::parse("a[href]").map_err(|_| RangeError::MalformedResponse {
            reason: "invalid anchor selector",
        })?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or(RangeError::MalformedResponse {
            reason: "no item table",
        })?;
    let href = table
        .select(&anchor_selector)
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .ok_or(RangeError::MalformedResponse {
            reason: "no item link in table",
        })?;

    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or(RangeError::MalformedResponse {
            reason: "item link does not end in an identifier",
        })
}

/// Fetches the index with `token` and returns the highest known identifier.
///
/// # Errors
///
/// See [`parse_index`]; transport failures are [`RangeError::Fetch`].
#[instrument(level = "debug", skip_all)]
pub async fn highest_known_id(
    source: &dyn PageSource,
    token: &SessionToken,
) -> Result<u64, RangeError> {
    let page = source.fetch_index(token).await?;
    let highest = parse_index(&page)?;
    debug!(highest, "read highest known identifier");
    Ok(highest)
}

/// Like [`highest_known_id`], but recovers from an expired session through
/// the shared refresher.
///
/// # Errors
///
/// Returns [`RangeError::Session`] if no replacement token can be obtained,
/// and any other [`RangeError`] unchanged.
pub async fn highest_known_id_with_refresh(
    source: &dyn PageSource,
    refresher: &SessionRefresher,
) -> Result<u64, RangeError> {
    loop {
        let token = refresher.holder().current();
        match highest_known_id(source, &token).await {
            Err(RangeError::AuthInvalid) => {
                refresher.refresh_after_failure(&token).await?;
            }
            other => return other,
        }
    }
}
