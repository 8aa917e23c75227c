//! HTTP access to the remote library.
//!
//! Pages are fetched with the current session token sent as a cookie. The
//! client never interprets the page; classification happens in
//! [`classify_page`](super::classify_page).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};
use url::Url;

use super::FetchError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::session::SessionToken;
use crate::user_agent;

/// Source of raw library pages.
///
/// Implemented by [`LibraryClient`]; tests and embedders can supply their own.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the page of item `id` using `token`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failures.
    async fn fetch_item(&self, id: u64, token: &SessionToken) -> Result<String, FetchError>;

    /// Fetches the index listing using `token`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failures.
    async fn fetch_index(&self, token: &SessionToken) -> Result<String, FetchError>;
}

/// HTTP client bound to one library base URL.
#[derive(Debug, Clone)]
pub struct LibraryClient {
    client: Client,
    base: Url,
    cookie_name: String,
}

impl LibraryClient {
    /// Creates a client with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] for an unusable base URL and
    /// [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, cookie_name: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeouts(base_url, cookie_name, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit connect/read timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Same as [`LibraryClient::new`].
    #[instrument(level = "debug", skip(cookie_name))]
    pub fn with_timeouts(
        base_url: &str,
        cookie_name: impl Into<String>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let base = parse_base_url(base_url)?;
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .map_err(|source| FetchError::Client { source })?;

        debug!(base = %base, "created library client");
        Ok(Self {
            client,
            base,
            cookie_name: cookie_name.into(),
        })
    }

    /// The library base URL (always ends with `/`).
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The session cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// URL of item `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if the URL cannot be formed.
    pub fn item_url(&self, id: u64) -> Result<Url, FetchError> {
        self.base
            .join(&id.to_string())
            .map_err(|_| FetchError::invalid_url(format!("{}{id}", self.base)))
    }

    /// Resolves user input that is either a bare identifier or a full item
    /// link under the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] for anything else.
    pub fn resolve_item_link(&self, input: &str) -> Result<Url, FetchError> {
        let input = input.trim();
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            let id = input
                .parse::<u64>()
                .map_err(|_| FetchError::invalid_url(input))?;
            return self.item_url(id);
        }
        if input.starts_with(self.base.as_str()) {
            return Url::parse(input).map_err(|_| FetchError::invalid_url(input));
        }
        Err(FetchError::invalid_url(input))
    }

    /// Fetches `url` with the session cookie and returns the trimmed body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failures.
    #[instrument(level = "debug", skip(self, token), fields(url = %url))]
    pub async fn fetch_url(&self, url: &Url, token: &SessionToken) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent::default_user_agent())
            .header(COOKIE, format!("{}={}", self.cookie_name, token.expose()))
            .send()
            .await
            .map_err(|e| FetchError::from_request(url.as_str(), e))?;

        debug!(status = response.status().as_u16(), "received response");

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_request(url.as_str(), e))?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl PageSource for LibraryClient {
    async fn fetch_item(&self, id: u64, token: &SessionToken) -> Result<String, FetchError> {
        let url = self.item_url(id)?;
        self.fetch_url(&url, token).await
    }

    async fn fetch_index(&self, token: &SessionToken) -> Result<String, FetchError> {
        let url = self.base.clone();
        self.fetch_url(&url, token).await
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, FetchError> {
    let mut base = Url::parse(base_url).map_err(|_| FetchError::invalid_url(base_url))?;
    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(FetchError::invalid_url(base_url));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}
