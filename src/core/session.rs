//! Per-client session state: cookie jar plus the server-issued token.

use crate::core::error::ScrapeError;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Owned by exactly one brokerage client. Never shared across clients, so two
/// sources polled in parallel cannot observe each other's cookies.
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
    token: Option<String>,
}

impl Session {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            jar,
            token: None,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The session token, if one has been established. Empty tokens are
    /// never stored.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> Result<(), ScrapeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ScrapeError::Authentication(
                "server returned an empty session token".to_string(),
            ));
        }
        debug!("Session token established");
        self.token = Some(token);
        Ok(())
    }

    /// Seeds the jar with a raw `name=value; name2=value2` cookie string for `url`.
    pub fn add_cookies(&self, raw: &str, url: &Url) {
        for cookie in raw.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            self.jar.add_cookie_str(cookie, url);
        }
    }
}
