//! Error taxonomy shared by every brokerage client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A step of the login handshake failed. Fatal for the current collection.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The session is missing or has silently expired.
    #[error("session is not established")]
    Unauthenticated,

    #[error("gave up after {attempts} re-authentication attempts")]
    RetryExhausted { attempts: usize },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to parse export: {0}")]
    Parse(String),
}

impl ScrapeError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ScrapeError::Unauthenticated)
    }

    pub(crate) fn auth(step: &str, err: impl std::fmt::Display) -> Self {
        ScrapeError::Authentication(format!("{step}: {err}"))
    }
}
