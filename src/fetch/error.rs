//! Error types for the fetch layer.

use thiserror::Error;

/// Transport-level failures while fetching a library page.
///
/// HTTP status codes are not errors here: the library serves its error and
/// login pages with varying statuses, so pages are classified by content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, reset, TLS, body read).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL being fetched.
        url: String,
    },

    /// The base URL or item link is not usable.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL or link.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Maps a request error to [`FetchError::Timeout`] or [`FetchError::Network`].
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_display() {
        let error = FetchError::invalid_url("not a url");
        assert_eq!(error.to_string(), "invalid URL: not a url");
    }

    #[test]
    fn test_timeout_display_names_url() {
        let error = FetchError::Timeout {
            url: "https://example.com/library/7".to_string(),
        };
        assert!(error.to_string().contains("/library/7"));
    }
}
