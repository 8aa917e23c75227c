use chrono::{DateTime, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use super::{ExtractError, Record, normalize_text};

/// Literal the library serves instead of an item when the session is not authenticated.
pub const AUTH_REQUIRED_MARKER: &str = "Authorize remote access";

/// Literal of the library's error page for an item that cannot be shown.
pub const UNAVAILABLE_MARKER: &str = "Slim Application Error";

/// Literal inside the danger alert of a deleted item.
pub const DELETED_MARKER: &str = "This book has been deleted";

const BODY_SELECTOR: &str = "div.card-body";
const HEADER_SELECTOR: &str = "h3.card-header";
const FOOTER_SELECTOR: &str = "div.card-footer";
const TIME_SELECTOR: &str = "time[datetime]";
const ANCHOR_SELECTOR: &str = "a";
const DANGER_ALERT_SELECTOR: &str = "div.alert.alert-danger";

/// Turns a raw item page into a [`Record`].
pub trait RecordParser: Send + Sync {
    /// Extracts the record for `id` from `page`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingBody`] when the page is not an item page
    /// and other variants when the item page is incomplete.
    fn parse(&self, id: u64, page: &str) -> Result<Record, ExtractError>;
}

/// Default extractor for the library's card-based item pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRecordParser;

impl RecordParser for HtmlRecordParser {
    fn parse(&self, id: u64, page: &str) -> Result<Record, ExtractError> {
        let document = Html::parse_document(page);

        let body = document
            .select(&selector(BODY_SELECTOR)?)
            .next()
            .ok_or(ExtractError::MissingBody)?;
        let raw_text = body.text().collect::<Vec<_>>().join(" ");

        let header = document
            .select(&selector(HEADER_SELECTOR)?)
            .next()
            .ok_or(ExtractError::MissingHeader)?;
        let (title, author, account_key) = split_header(&header.text().collect::<String>());

        let footer = document.select(&selector(FOOTER_SELECTOR)?).next();
        let published_at = match footer {
            Some(footer) => published_time(footer)?,
            None => None,
        }
        .unwrap_or(DateTime::UNIX_EPOCH);
        let published_round = match footer {
            Some(footer) => published_round(footer)?,
            None => None,
        }
        .unwrap_or(0);

        let deleted = document
            .select(&selector(DANGER_ALERT_SELECTOR)?)
            .any(|alert| alert.text().collect::<String>().contains(DELETED_MARKER));

        let normalized_text = normalize_text(&raw_text);

        Ok(Record {
            id,
            title,
            author,
            account_key,
            raw_text,
            normalized_text,
            deleted,
            published_at,
            published_round,
        })
    }
}

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector { css })
}

/// Splits the header text into (title, author, account key).
///
/// The header renders as separate lines: title, `By <author>`, a `|`
/// separator and the account key.
fn split_header(text: &str) -> (String, String, String) {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "|");

    let title = lines.next().unwrap_or_default().to_string();
    let author = lines
        .next()
        .map(|line| line.strip_prefix("By").unwrap_or(line).trim().to_string())
        .unwrap_or_default();
    let account_key = lines.next().unwrap_or_default().to_string();
    (title, author, account_key)
}

fn published_time(footer: ElementRef<'_>) -> Result<Option<DateTime<Utc>>, ExtractError> {
    Ok(footer
        .select(&selector(TIME_SELECTOR)?)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .and_then(parse_timestamp))
}

fn published_round(footer: ElementRef<'_>) -> Result<Option<i64>, ExtractError> {
    Ok(footer
        .select(&selector(ANCHOR_SELECTOR)?)
        .next()
        .and_then(|anchor| anchor.text().collect::<String>().trim().parse().ok()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
