//! Library records and the default page extractor.
//!
//! A [`Record`] is built once from a successfully fetched item page and never
//! changes afterwards. Extraction is pluggable through [`RecordParser`]; the
//! bundled [`HtmlRecordParser`] understands the library's card layout.

mod error;
mod extract;
mod normalize;

use chrono::{DateTime, Utc};

pub use error::ExtractError;
pub use extract::{
    AUTH_REQUIRED_MARKER, DELETED_MARKER, HtmlRecordParser, RecordParser, UNAVAILABLE_MARKER,
};
pub use normalize::normalize_text;

/// A fetched library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identifier assigned by the remote library.
    pub id: u64,
    /// Item title.
    pub title: String,
    /// Display name of the author.
    pub author: String,
    /// Account key of the author.
    pub account_key: String,
    /// Body text as extracted from the page.
    pub raw_text: String,
    /// Body text after [`normalize_text`].
    pub normalized_text: String,
    /// Whether the library flags the item as deleted.
    pub deleted: bool,
    /// Publication time; the Unix epoch when the page does not carry one.
    pub published_at: DateTime<Utc>,
    /// Publication round; 0 when the page does not carry one.
    pub published_round: i64,
}

impl Record {
    /// Returns the text to persist, raw or normalized.
    #[must_use]
    pub fn text(&self, raw: bool) -> &str {
        if raw {
            &self.raw_text
        } else {
            &self.normalized_text
        }
    }
}
