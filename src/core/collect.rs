//! Fetch-parse loop with transparent re-authentication.

use crate::core::config::Credentials;
use crate::core::error::ScrapeError;
use crate::core::export::ExportPayload;
use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

pub const DEFAULT_MAX_REAUTH: usize = 3;

/// A scraping client for one brokerage portal. Each instance owns its own
/// session; callers must not run two collections on one instance at once.
#[async_trait]
pub trait BrokerageClient: Send + Sync {
    type Snapshot: Send;

    fn name(&self) -> &'static str;

    /// Runs the full login handshake, replacing the session token on success.
    async fn login(&mut self, credentials: &Credentials) -> Result<(), ScrapeError>;

    /// Fetches the raw export. Returns [`ScrapeError::Unauthenticated`] when
    /// no session exists or the server reports it expired.
    async fn fetch_export(&self) -> Result<ExportPayload, ScrapeError>;

    fn parse_export(&self, payload: &ExportPayload) -> Result<Self::Snapshot, ScrapeError>;
}

/// Fetches and parses an export, logging in again whenever the session turns
/// out to be missing or expired.
///
/// At most `max_reauth` logins are attempted. A failing login aborts
/// immediately with its own error; any other fetch or parse error is returned
/// without retrying.
#[instrument(name = "Collect", skip_all, fields(source = client.name()))]
pub async fn collect<C: BrokerageClient>(
    client: &mut C,
    credentials: &Credentials,
    max_reauth: usize,
) -> Result<C::Snapshot, ScrapeError> {
    let mut reauth_count = 0;
    loop {
        match client.fetch_export().await {
            Ok(payload) => {
                debug!(bytes = payload.body.len(), "Fetched export");
                return client.parse_export(&payload);
            }
            Err(ScrapeError::Unauthenticated) => {
                if reauth_count >= max_reauth {
                    error!(attempts = reauth_count, "Re-authentication limit reached");
                    return Err(ScrapeError::RetryExhausted {
                        attempts: reauth_count,
                    });
                }
                reauth_count += 1;
                warn!(
                    attempt = reauth_count,
                    max_reauth, "Session not established, logging in"
                );
                if let Err(e) = client.login(credentials).await {
                    error!(error = %e, "Login failed");
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of fetch outcomes and counts logins.
    struct ScriptedClient {
        fetches: Mutex<VecDeque<Result<ExportPayload, ScrapeError>>>,
        fetch_count: AtomicUsize,
        login_count: usize,
        login_fails: bool,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<ExportPayload, ScrapeError>>) -> Self {
            Self {
                fetches: Mutex::new(script.into()),
                fetch_count: AtomicUsize::new(0),
                login_count: 0,
                login_fails: false,
            }
        }
    }

    fn payload(body: &str) -> ExportPayload {
        ExportPayload {
            media_type: "text/plain".to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[async_trait]
    impl BrokerageClient for ScriptedClient {
        type Snapshot = String;

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn login(&mut self, _credentials: &Credentials) -> Result<(), ScrapeError> {
            self.login_count += 1;
            if self.login_fails {
                return Err(ScrapeError::Authentication("bad password".to_string()));
            }
            Ok(())
        }

        async fn fetch_export(&self) -> Result<ExportPayload, ScrapeError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            self.fetches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ScrapeError::Unauthenticated))
        }

        fn parse_export(&self, payload: &ExportPayload) -> Result<String, ScrapeError> {
            String::from_utf8(payload.body.clone()).map_err(|e| ScrapeError::Parse(e.to_string()))
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("user", "secret")
    }

    #[tokio::test]
    async fn test_retry_bound_exhausted() {
        let mut client = ScriptedClient::new(vec![]);

        let err = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::RetryExhausted { attempts: 3 }));
        assert_eq!(client.login_count, 3);
        assert_eq!(client.fetch_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_reauth_then_success() {
        let mut client =
            ScriptedClient::new(vec![Err(ScrapeError::Unauthenticated), Ok(payload("ok"))]);

        let snapshot = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap();

        assert_eq!(snapshot, "ok");
        assert_eq!(client.login_count, 1);
    }

    #[tokio::test]
    async fn test_existing_session_skips_login() {
        let mut client = ScriptedClient::new(vec![Ok(payload("cached"))]);

        let snapshot = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap();

        assert_eq!(snapshot, "cached");
        assert_eq!(client.login_count, 0);
    }

    #[tokio::test]
    async fn test_login_failure_aborts() {
        let mut client = ScriptedClient::new(vec![]);
        client.login_fails = true;

        let err = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Authentication(_)));
        assert_eq!(client.login_count, 1);
        assert_eq!(client.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let mut client = ScriptedClient::new(vec![Err(ScrapeError::Transport(
            "503 Service Unavailable".to_string(),
        ))]);

        let err = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Transport(_)));
        assert_eq!(client.login_count, 0);
        assert_eq!(client.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parse_error_not_retried() {
        let mut client = ScriptedClient::new(vec![Ok(ExportPayload {
            media_type: "text/plain".to_string(),
            body: vec![0xff, 0xfe],
        })]);

        let err = collect(&mut client, &credentials(), DEFAULT_MAX_REAUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Parse(_)));
        assert_eq!(client.login_count, 0);
    }

    #[tokio::test]
    async fn test_zero_bound_never_logs_in() {
        let mut client = ScriptedClient::new(vec![]);

        let err = collect(&mut client, &credentials(), 0).await.unwrap_err();

        assert!(matches!(err, ScrapeError::RetryExhausted { attempts: 0 }));
        assert_eq!(client.login_count, 0);
    }
}
