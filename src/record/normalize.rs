//! Light cleanup of extracted page text.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{2,}").ok());
static EMPTY_SENTENCES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\. \.)( \.)*").ok());
static SPACE_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r" {2,}").ok());

const REPLACEMENTS: [(&str, &str); 5] = [
    ("\u{201e}", "\""),
    ("\u{201d}", "\""),
    ("\u{2019}", "'"),
    ("\n", ". "),
    (" . ", ". "),
];

/// Normalizes extracted text into sentence-separated plain text.
///
/// The text is first put in compatibility decomposition (NFKD), so
/// ligatures and no-break spaces become their plain forms. Blank-line runs
/// are dropped, typographic quotes are folded to ASCII, single
/// newlines become sentence breaks, empty sentences and repeated spaces are
/// collapsed, and leading/trailing dots and whitespace are trimmed.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let decomposed: String = raw.nfkd().collect();
    let mut text = replace_all(&BLANK_LINES, &decomposed, "");
    for (from, to) in REPLACEMENTS {
        text = text.replace(from, to);
    }
    text = replace_all(&EMPTY_SENTENCES, &text, " ");
    text = replace_all(&SPACE_RUNS, &text, " ");
    text.trim_matches('.').trim().to_string()
}

fn replace_all(pattern: &LazyLock<Option<Regex>>, text: &str, with: &str) -> String {
    match pattern.as_ref() {
        Some(regex) => regex.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}
