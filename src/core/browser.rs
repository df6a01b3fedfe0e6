//! Request templates that mimic a desktop Edge browser.
//!
//! The brokerage portals run bot-detection on header shape, so every request
//! is built from one of two fixed templates (page navigation or XHR) and only
//! the per-step headers are layered on top. Header order is preserved.

use crate::core::error::ScrapeError;
use crate::core::session::Session;
use reqwest::{Method, Response};
use tracing::debug;
use url::Url;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 Edg/134.0.0.0";
const SEC_CH_UA: &str = r#""Chromium";v="134", "Not:A-Brand";v="24", "Microsoft Edge";v="134""#;
const ACCEPT_DOCUMENT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Value of the `Sec-Fetch-Site` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSite {
    None,
    SameOrigin,
    SameSite,
}

impl FetchSite {
    fn as_str(self) -> &'static str {
        match self {
            FetchSite::None => "none",
            FetchSite::SameOrigin => "same-origin",
            FetchSite::SameSite => "same-site",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    url: Url,
    headers: Vec<(&'static str, String)>,
    body: Option<String>,
}

impl RequestTemplate {
    /// A top-level page navigation initiated by the user.
    pub fn document(method: Method, url: Url, site: FetchSite) -> Self {
        let headers = vec![
            ("Accept", ACCEPT_DOCUMENT.to_string()),
            ("Accept-Language", "ja".to_string()),
            ("Priority", "u=0, i".to_string()),
            ("Sec-Ch-Ua", SEC_CH_UA.to_string()),
            ("Sec-Ch-Ua-Mobile", "?0".to_string()),
            ("Sec-Ch-Ua-Platform", r#""Windows""#.to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", site.as_str().to_string()),
            ("Sec-Fetch-User", "?1".to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("User-Agent", USER_AGENT.to_string()),
        ];
        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// A same-origin `fetch()`/XHR call issued by page scripts.
    pub fn xhr(method: Method, url: Url) -> Self {
        let headers = vec![
            ("Accept", "*/*".to_string()),
            ("Accept-Language", "ja".to_string()),
            ("Priority", "u=1, i".to_string()),
            ("Sec-Ch-Ua", SEC_CH_UA.to_string()),
            ("Sec-Ch-Ua-Mobile", "?0".to_string()),
            ("Sec-Ch-Ua-Platform", r#""Windows""#.to_string()),
            ("Sec-Fetch-Dest", "empty".to_string()),
            ("Sec-Fetch-Mode", "cors".to_string()),
            ("Sec-Fetch-Site", FetchSite::SameOrigin.as_str().to_string()),
            ("User-Agent", USER_AGENT.to_string()),
            ("X-Requested-With", "XMLHttpRequest".to_string()),
        ];
        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Sets a header, replacing an existing value in place.
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self
    }

    /// Attaches an `application/x-www-form-urlencoded` body.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut template = self.header("Content-Type", "application/x-www-form-urlencoded");
        template.body = Some(body);
        template
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    #[cfg(test)]
    pub(crate) fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    pub async fn send(self, session: &Session) -> Result<Response, reqwest::Error> {
        debug!(method = %self.method, url = %self.url, "Sending request");
        let mut builder = session.client().request(self.method, self.url);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        builder.send().await
    }
}

/// Sends a login step and treats transport failures and non-2xx statuses as
/// fatal for the login attempt.
pub async fn send_login_step(
    template: RequestTemplate,
    session: &Session,
    step: &str,
) -> Result<Response, ScrapeError> {
    let response = template
        .send(session)
        .await
        .map_err(|e| ScrapeError::auth(step, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::auth(step, format!("unexpected status {status}")));
    }
    debug!(step, %status, "Login step succeeded");
    Ok(response)
}
