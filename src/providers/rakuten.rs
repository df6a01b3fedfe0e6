use crate::core::browser::{FetchSite, RequestTemplate, send_login_step};
use crate::core::collect::BrokerageClient;
use crate::core::config::{Credentials, RakutenConfig};
use crate::core::encoding::decode_shift_jis;
use crate::core::error::ScrapeError;
use crate::core::export::{ExportPayload, classify_export};
use crate::core::parser::parse_csv_export;
use crate::core::session::Session;
use crate::core::snapshot::AccountSnapshot;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Method;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const SESSION_PARAM: &str = "BV_SessionID";
const CSV_MEDIA_TYPE: &str = "text/comma-separated-values";
const POSSESS_LIST_QUERY: &str =
    "eventType=directInit&l-id=mem_pc_top_all-possess-lst&gmn=H&smn=01&lmn=&fmn=";

static LOCATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"location\.href\s*=\s*"([^"]+)""#).expect("location pattern is valid")
});

/// Finds the post-login `location.href = "..."` redirect and returns the
/// target together with its session id.
pub(crate) fn extract_session_redirect(
    body: &str,
    base: &Url,
) -> Result<(Url, String), ScrapeError> {
    let location = LOCATION_REGEX
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ScrapeError::Authentication("login response has no redirect instruction".to_string())
        })?;

    let target = base
        .join(location)
        .map_err(|e| ScrapeError::auth("parse redirect", e))?;
    let session_id = target
        .query_pairs()
        .find(|(key, _)| key == SESSION_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ScrapeError::Authentication("session id not found in redirect".to_string())
        })?;

    Ok((target, session_id))
}

/// Client for the Rakuten Securities member portal and its holdings CSV.
pub struct RakutenClient {
    session: Session,
    www_url: String,
    member_url: String,
}

impl RakutenClient {
    pub fn new(config: &RakutenConfig, timeout: Duration) -> Result<Self, ScrapeError> {
        Ok(Self {
            session: Session::new(timeout)?,
            www_url: config.www_url.trim_end_matches('/').to_string(),
            member_url: config.member_url.trim_end_matches('/').to_string(),
        })
    }

    fn parse(url: &str) -> Result<Url, url::ParseError> {
        Url::parse(url)
    }

    /// `{member}/app/{page};BV_SessionID={id}?{query}`
    fn session_page(&self, page: &str, session_id: &str, query: &str) -> String {
        format!(
            "{}/app/{page};{SESSION_PARAM}={session_id}?{query}",
            self.member_url
        )
    }

    async fn run_login(&self, credentials: &Credentials) -> Result<String, ScrapeError> {
        let www_root = format!("{}/", self.www_url);
        let login_url = format!("{}/app/MhLogin.do", self.member_url);
        let url = |s: &str| Self::parse(s).map_err(|e| ScrapeError::auth("build url", e));

        // Seed cookies from the public top page
        let top = RequestTemplate::document(Method::GET, url(&www_root)?, FetchSite::None)
            .header("Referer", &www_root);
        send_login_step(top, &self.session, "top page").await?;

        let submit = RequestTemplate::document(Method::POST, url(&login_url)?, FetchSite::SameOrigin)
            .header("Cache-Control", "max-age=0")
            .header("Origin", &self.www_url)
            .header("Referer", &www_root)
            .form(&[
                ("loginid", credentials.username.as_str()),
                ("passwd", credentials.password.as_str()),
                ("homeid", "HOME"),
            ]);
        let response = send_login_step(submit, &self.session, "submit credentials").await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::auth("read login response", e))?;
        let (redirect, session_id) =
            extract_session_redirect(&decode_shift_jis(&body), &url(&self.member_url)?)?;
        debug!(redirect = %redirect.path(), "Extracted session redirect");

        let home = RequestTemplate::document(Method::GET, redirect, FetchSite::SameOrigin)
            .without("Sec-Fetch-User")
            .header("Referer", &login_url);
        send_login_step(home, &self.session, "follow redirect").await?;

        let possess_list = self.session_page("ass_all_possess_lst.do", &session_id, POSSESS_LIST_QUERY);
        let home_referer = format!(
            "{}&{SESSION_PARAM}={session_id}",
            self.session_page("home.do", &session_id, "eventType=init")
        );
        let list = RequestTemplate::document(Method::GET, url(&possess_list)?, FetchSite::SameOrigin)
            .header("Referer", home_referer);
        send_login_step(list, &self.session, "holdings page").await?;

        let balance_url = self.session_page(
            "async_all_possess_lst_balance_lst.do",
            &session_id,
            "assetCloseFlg=1",
        );
        let balance = RequestTemplate::xhr(Method::POST, url(&balance_url)?)
            .header("Origin", &self.member_url)
            .header("Referer", &possess_list);
        send_login_step(balance, &self.session, "balance list").await?;

        // The positions endpoint only answers 2xx for a fully established session
        let probe_url =
            self.session_page("async_all_possess_lst_pos_lst.do", &session_id, "assetCloseFlg=1");
        let probe = RequestTemplate::xhr(Method::POST, url(&probe_url)?)
            .header("Origin", &self.member_url)
            .header("Referer", &possess_list);
        send_login_step(probe, &self.session, "verify session").await?;

        Ok(session_id)
    }
}

#[async_trait]
impl BrokerageClient for RakutenClient {
    type Snapshot = AccountSnapshot;

    fn name(&self) -> &'static str {
        "rakuten"
    }

    #[instrument(name = "RakutenLogin", skip_all, fields(user = %credentials.username))]
    async fn login(&mut self, credentials: &Credentials) -> Result<(), ScrapeError> {
        let session_id = self.run_login(credentials).await?;
        self.session.set_token(session_id)?;
        info!("Logged in to Rakuten Securities");
        Ok(())
    }

    #[instrument(name = "RakutenExport", skip_all)]
    async fn fetch_export(&self) -> Result<ExportPayload, ScrapeError> {
        let session_id = self.session.token().ok_or(ScrapeError::Unauthenticated)?;

        let export_url = Self::parse(&self.session_page(
            "ass_all_possess_lst.do",
            session_id,
            "eventType=csv",
        ))
        .map_err(|e| ScrapeError::Transport(format!("invalid export url: {e}")))?;
        let referer = self.session_page("ass_all_possess_lst.do", session_id, POSSESS_LIST_QUERY);

        let response = RequestTemplate::document(Method::GET, export_url, FetchSite::SameOrigin)
            .header("Referer", referer)
            .send(&self.session)
            .await
            .map_err(|e| ScrapeError::Transport(format!("export request failed: {e}")))?;

        classify_export(response, CSV_MEDIA_TYPE).await
    }

    fn parse_export(&self, payload: &ExportPayload) -> Result<AccountSnapshot, ScrapeError> {
        parse_csv_export(&decode_shift_jis(&payload.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collect::{DEFAULT_MAX_REAUTH, collect};
    use encoding_rs::SHIFT_JIS;
    use wiremock::matchers::{
        body_string_contains, header, header_regex, method, path, path_regex, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PAGE: &str = r#"<html><head><script>
        location.href = "/app/home.do;BV_SessionID=SESSION123?eventType=init&BV_SessionID=SESSION123";
    </script></head></html>"#;

    const EXPORT_CSV: &str = "\"■資産合計欄\"\r\n\
\"\",\"時価評価額[円]\",\"前日比[円]\",\"前日比[％]\",\"前月比[円]\",\"前月比[％]\",\"評価損益[円]\",\"評価損益[％]\",\"\",\"実現損益[円]\",\"配当・分配金[円貨]\",\"配当・分配金[外貨]\"\r\n\
\"合計\",\"2,000,000\",\"+10,000\",\"+0.50\",\"+50,000\",\"+2.56\",\"+300,000\",\"+17.65\",\"\",\"12,345\",\"6,789\",\"-\"\r\n\
\"■参考為替レート\"\r\n\
\"米ドル\",\"146.26\",\"円/USD\",\"(04/04  01:20)\"\r\n";

    fn config(mock_server: &MockServer) -> RakutenConfig {
        RakutenConfig {
            credentials: Credentials::new("user", "secret"),
            www_url: mock_server.uri(),
            member_url: mock_server.uri(),
        }
    }

    fn client(mock_server: &MockServer) -> RakutenClient {
        RakutenClient::new(&config(mock_server), Duration::from_secs(5)).unwrap()
    }

    async fn mount_login(mock_server: &MockServer, login_body: &str, expected_logins: u64) {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_regex("User-Agent", "Edg/134"))
            .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "Rg_sec=seed; Path=/"))
            .expect(expected_logins)
            .mount(mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/app/MhLogin.do"))
            .and(header("Cookie", "Rg_sec=seed"))
            .and(body_string_contains("loginid=user"))
            .and(body_string_contains("passwd=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_body))
            .mount(mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/app/home\.do;BV_SessionID=SESSION123$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/app/ass_all_possess_lst\.do;BV_SessionID=SESSION123$"))
            .and(query_param("eventType", "directInit"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/app/async_all_possess_lst_balance_lst\.do;"))
            .and(header("X-Requested-With", "XMLHttpRequest"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/app/async_all_possess_lst_pos_lst\.do;"))
            .respond_with(ResponseTemplate::new(200))
            .mount(mock_server)
            .await;
    }

    async fn mount_export(mock_server: &MockServer) {
        let (encoded, _, _) = SHIFT_JIS.encode(EXPORT_CSV);
        Mock::given(method("GET"))
            .and(path_regex(r"^/app/ass_all_possess_lst\.do;BV_SessionID=SESSION123$"))
            .and(query_param("eventType", "csv"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                encoded.into_owned(),
                "text/comma-separated-values; charset=Shift_JIS",
            ))
            .mount(mock_server)
            .await;
    }

    #[test]
    fn test_extract_session_redirect() {
        let base = Url::parse("https://member.rakuten-sec.co.jp").unwrap();
        let (target, session_id) = extract_session_redirect(LOGIN_PAGE, &base).unwrap();
        assert_eq!(session_id, "SESSION123");
        assert_eq!(target.host_str(), Some("member.rakuten-sec.co.jp"));
        assert_eq!(target.path(), "/app/home.do;BV_SessionID=SESSION123");
    }

    #[test]
    fn test_extract_session_redirect_failures() {
        let base = Url::parse("https://member.rakuten-sec.co.jp").unwrap();
        let missing = extract_session_redirect("<html>ログインできません</html>", &base);
        assert!(matches!(missing, Err(ScrapeError::Authentication(_))));

        let empty = extract_session_redirect(
            r#"location.href = "/app/home.do?eventType=init&BV_SessionID=""#,
            &base,
        );
        assert!(matches!(empty, Err(ScrapeError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_fetch_without_session_makes_no_request() {
        let mock_server = MockServer::start().await;
        let client = client(&mock_server);

        let err = client.fetch_export().await.unwrap_err();

        assert!(err.is_unauthenticated());
        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let mock_server = MockServer::start().await;
        mount_login(&mock_server, LOGIN_PAGE, 1).await;
        let mut client = client(&mock_server);

        client
            .login(&Credentials::new("user", "secret"))
            .await
            .unwrap();

        assert_eq!(client.session.token(), Some("SESSION123"));
    }

    #[tokio::test]
    async fn test_login_without_redirect_fails() {
        let mock_server = MockServer::start().await;
        mount_login(&mock_server, "<html>error</html>", 1).await;
        let mut client = client(&mock_server);

        let err = client
            .login(&Credentials::new("user", "secret"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Authentication(_)));
        assert!(client.session.token().is_none());
    }

    #[tokio::test]
    async fn test_login_step_failure_keeps_prior_state() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        let mut client = client(&mock_server);

        let err = client
            .login(&Credentials::new("user", "secret"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("top page"));
        assert!(client.session.token().is_none());
    }

    #[tokio::test]
    async fn test_collect_logs_in_once_and_parses() {
        let mock_server = MockServer::start().await;
        mount_login(&mock_server, LOGIN_PAGE, 1).await;
        mount_export(&mock_server).await;
        let mut client = client(&mock_server);

        let snapshot = collect(&mut client, &Credentials::new("user", "secret"), DEFAULT_MAX_REAUTH)
            .await
            .unwrap();

        assert_eq!(snapshot.summaries.len(), 1);
        assert_eq!(snapshot.summaries[0].title, "合計");
        assert_eq!(snapshot.summaries[0].estimate_amount, 2_000_000);
        assert!(snapshot.holdings.is_empty());
        assert_eq!(snapshot.exchange_rates[0].currency_name, "米ドル");
    }

    #[tokio::test]
    async fn test_expired_session_html_exhausts_retries() {
        let mock_server = MockServer::start().await;
        mount_login(&mock_server, LOGIN_PAGE, 3).await;
        Mock::given(method("GET"))
            .and(query_param("eventType", "csv"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>timeout</html>", "text/html"),
            )
            .expect(3)
            .mount(&mock_server)
            .await;
        let mut client = client(&mock_server);

        let err = collect(&mut client, &Credentials::new("user", "secret"), DEFAULT_MAX_REAUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::RetryExhausted { attempts: 3 }));
    }
}
