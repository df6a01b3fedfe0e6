use crate::core::browser::{FetchSite, RequestTemplate, send_login_step};
use crate::core::collect::BrokerageClient;
use crate::core::config::{Credentials, SbiConfig};
use crate::core::error::ScrapeError;
use crate::core::export::{ExportPayload, classify_export};
use crate::core::fund::FundAssets;
use crate::core::parser::parse_fund_assets;
use crate::core::session::Session;
use async_trait::async_trait;
use reqwest::Method;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const JSON_MEDIA_TYPE: &str = "application/json";
const JSON_ACCEPT: &str = "application/json; charset=utf-8";
const SUCCESS_STATUS: &str = "SUCCESS";
const FUND_TOP_QUERY: &str = "_ControlID=WPLETsmR001Control&_PageID=WPLETsmR001Sdtl23&_DataStoreID=DSWPLETsmR001Control&_ActionID=NoActionID&getFlg=on&OutSide=on&path=fund%2Ftop";

const LOGIN_FORM: [(&str, &str); 10] = [
    ("JS_FLG", "1"),
    ("BW_FLG", "chrome,134"),
    ("_ControlID", "WPLETlgR001Control"),
    ("_DataStoreID", "DSWPLETlgR001Control"),
    ("_PageID", "WPLETlgR001Rlgn20"),
    ("_ActionID", "login"),
    ("getFlg", "on"),
    ("allPrmFlg", "on"),
    (
        "_ReturnPageInfo",
        "WPLEThmR001Control/DefaultPID/DefaultAID/DSWPLEThmR001Control",
    ),
    ("ACT_login", "%83%8D%83O%83C%83%93"),
];

static CSRF_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="_csrf"]"#).expect("csrf selector is valid")
});

/// Reads the `content` of the portal's `<meta name="_csrf">` element.
pub(crate) fn extract_csrf_token(page: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(page);
    let token = document
        .select(&CSRF_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .find(|token| !token.is_empty())
        .map(str::to_string);
    token.ok_or_else(|| ScrapeError::Authentication("csrf token not found".to_string()))
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    status: String,
}

/// Client for the SBI Securities fund portal and its JSON assets API.
pub struct SbiClient {
    session: Session,
    login_url: String,
    portal_url: String,
    member_url: String,
}

impl SbiClient {
    pub fn new(config: &SbiConfig, timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Self {
            session: Session::new(timeout)?,
            login_url: config.login_url.trim_end_matches('/').to_string(),
            portal_url: config.portal_url.trim_end_matches('/').to_string(),
            member_url: config.member_url.trim_end_matches('/').to_string(),
        };

        if let Some(cookie) = config.device_cookie.as_deref() {
            for base in [&client.login_url, &client.portal_url, &client.member_url] {
                let url = Url::parse(base).map_err(|e| {
                    ScrapeError::Transport(format!("invalid base url {base}: {e}"))
                })?;
                client.session.add_cookies(cookie, &url);
            }
            debug!("Seeded device authentication cookie");
        }
        Ok(client)
    }

    fn url(raw: &str) -> Result<Url, ScrapeError> {
        Url::parse(raw).map_err(|e| ScrapeError::auth("build url", e))
    }

    async fn run_login(&self, credentials: &Credentials) -> Result<String, ScrapeError> {
        let gate = format!("{}/ETGate/", self.login_url);

        let top = RequestTemplate::document(Method::GET, Self::url(&gate)?, FetchSite::SameOrigin);
        send_login_step(top, &self.session, "login page").await?;

        let mut form = LOGIN_FORM.to_vec();
        form.push(("user_id", credentials.username.as_str()));
        form.push(("user_password", credentials.password.as_str()));
        let submit = RequestTemplate::document(Method::POST, Self::url(&gate)?, FetchSite::SameOrigin)
            .header("Origin", &self.login_url)
            .header("Referer", format!("{}/", self.login_url))
            .form(&form);
        send_login_step(submit, &self.session, "submit credentials").await?;

        let portal = format!("{}/ETGate/?{FUND_TOP_QUERY}", self.portal_url);
        let fund_top = RequestTemplate::document(Method::GET, Self::url(&portal)?, FetchSite::None);
        let response = send_login_step(fund_top, &self.session, "fund portal").await?;
        let page = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::auth("read fund portal", e))?;
        let csrf_token = extract_csrf_token(&String::from_utf8_lossy(&page))?;
        debug!("Extracted csrf token");

        let info_url = format!("{}/system/api/account/info", self.member_url);
        let probe = RequestTemplate::xhr(Method::GET, Self::url(&info_url)?)
            .without("X-Requested-With")
            .header("Accept", JSON_ACCEPT)
            .header("Referer", format!("{}/fund/top", self.member_url));
        let response = send_login_step(probe, &self.session, "verify session").await?;
        let info: AccountInfo = response
            .json()
            .await
            .map_err(|e| ScrapeError::auth("decode account info", e))?;
        if info.status != SUCCESS_STATUS {
            return Err(ScrapeError::Authentication(format!(
                "unexpected account info status: {:?}",
                info.status
            )));
        }

        Ok(csrf_token)
    }
}

#[async_trait]
impl BrokerageClient for SbiClient {
    type Snapshot = FundAssets;

    fn name(&self) -> &'static str {
        "sbi"
    }

    #[instrument(name = "SbiLogin", skip_all, fields(user = %credentials.username))]
    async fn login(&mut self, credentials: &Credentials) -> Result<(), ScrapeError> {
        let csrf_token = self.run_login(credentials).await?;
        self.session.set_token(csrf_token)?;
        info!("Logged in to SBI Securities");
        Ok(())
    }

    #[instrument(name = "SbiExport", skip_all)]
    async fn fetch_export(&self) -> Result<ExportPayload, ScrapeError> {
        let csrf_token = self.session.token().ok_or(ScrapeError::Unauthenticated)?;

        let assets_url = format!("{}/fund/api/account/assets?accountGetType=2", self.member_url);
        let assets_url = Url::parse(&assets_url)
            .map_err(|e| ScrapeError::Transport(format!("invalid export url: {e}")))?;

        let response = RequestTemplate::xhr(Method::GET, assets_url)
            .without("X-Requested-With")
            .header("Accept", JSON_ACCEPT)
            .header("Accept-Language", "ja,en;q=0.9")
            .header("Dnt", "1")
            .header("Referer", format!("{}/fund/account/assets", self.member_url))
            .header("x-csrf-token", csrf_token)
            .send(&self.session)
            .await
            .map_err(|e| ScrapeError::Transport(format!("export request failed: {e}")))?;

        classify_export(response, JSON_MEDIA_TYPE).await
    }

    fn parse_export(&self, payload: &ExportPayload) -> Result<FundAssets, ScrapeError> {
        parse_fund_assets(&payload.body)
    }
}
