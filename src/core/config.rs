use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::collect::DEFAULT_MAX_REAUTH;

pub const RAKUTEN_USERNAME_ENV: &str = "RAKUTEN_SECURITIES_USERNAME";
pub const RAKUTEN_PASSWORD_ENV: &str = "RAKUTEN_SECURITIES_PASSWORD";
pub const SBI_USERNAME_ENV: &str = "SBI_SECURITIES_USERNAME";
pub const SBI_PASSWORD_ENV: &str = "SBI_SECURITIES_PASSWORD";
pub const SBI_DEVICE_COOKIE_ENV: &str = "SBI_SECURITIES_DEVICE_COOKIE";

const LOGIN_REQUESTS: u32 = 6;

#[derive(Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RakutenConfig {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_rakuten_www_url")]
    pub www_url: String,
    #[serde(default = "default_rakuten_member_url")]
    pub member_url: String,
}

fn default_rakuten_www_url() -> String {
    "https://www.rakuten-sec.co.jp".to_string()
}

fn default_rakuten_member_url() -> String {
    "https://member.rakuten-sec.co.jp".to_string()
}

impl Default for RakutenConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            www_url: default_rakuten_www_url(),
            member_url: default_rakuten_member_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SbiConfig {
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Raw `name=value; ...` cookie string from a device already registered
    /// with the portal's device authentication.
    pub device_cookie: Option<String>,
    #[serde(default = "default_sbi_login_url")]
    pub login_url: String,
    #[serde(default = "default_sbi_portal_url")]
    pub portal_url: String,
    #[serde(default = "default_sbi_member_url")]
    pub member_url: String,
}

fn default_sbi_login_url() -> String {
    "https://site1.sbisec.co.jp".to_string()
}

fn default_sbi_portal_url() -> String {
    "https://www.sbisec.co.jp".to_string()
}

fn default_sbi_member_url() -> String {
    "https://member.c.sbisec.co.jp".to_string()
}

impl Default for SbiConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            device_cookie: None,
            login_url: default_sbi_login_url(),
            portal_url: default_sbi_portal_url(),
            member_url: default_sbi_member_url(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_reauth() -> usize {
    DEFAULT_MAX_REAUTH
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    pub rakuten: Option<RakutenConfig>,
    pub sbi: Option<SbiConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_reauth")]
    pub max_reauth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rakuten: None,
            sbi: None,
            timeout_secs: default_timeout_secs(),
            max_reauth: default_max_reauth(),
        }
    }
}

impl AppConfig {
    /// Loads the config at the default location, falling back to an empty
    /// config when no file exists. Environment credentials are applied last.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_file(&config_path)?
        } else {
            debug!(
                "No config file at {}, using environment only",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("jp", "kabuscrape", "kabuscrape")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Overrides credentials from environment variables, enabling a source
    /// when its credentials are only present in the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let rakuten_user = non_empty(RAKUTEN_USERNAME_ENV);
        let rakuten_pass = non_empty(RAKUTEN_PASSWORD_ENV);
        if rakuten_user.is_some() || rakuten_pass.is_some() {
            let rakuten = self.rakuten.get_or_insert_with(RakutenConfig::default);
            if let Some(user) = rakuten_user {
                rakuten.credentials.username = user;
            }
            if let Some(pass) = rakuten_pass {
                rakuten.credentials.password = pass;
            }
        }

        let sbi_user = non_empty(SBI_USERNAME_ENV);
        let sbi_pass = non_empty(SBI_PASSWORD_ENV);
        let sbi_cookie = non_empty(SBI_DEVICE_COOKIE_ENV);
        if sbi_user.is_some() || sbi_pass.is_some() || sbi_cookie.is_some() {
            let sbi = self.sbi.get_or_insert_with(SbiConfig::default);
            if let Some(user) = sbi_user {
                sbi.credentials.username = user;
            }
            if let Some(pass) = sbi_pass {
                sbi.credentials.password = pass;
            }
            if sbi_cookie.is_some() {
                sbi.device_cookie = sbi_cookie;
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound for one whole collection: every login is at most six requests and
    /// every fetch one, each bounded by `timeout`.
    pub fn collection_deadline(&self) -> Duration {
        let max_reauth = u32::try_from(self.max_reauth).unwrap_or(u32::MAX);
        let requests = (LOGIN_REQUESTS + 1)
            .saturating_mul(max_reauth)
            .saturating_add(1);
        self.timeout().saturating_mul(requests)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rakuten.is_none() && self.sbi.is_none() {
            bail!("No brokerage configured; add a rakuten or sbi section or set credentials in the environment");
        }
        if let Some(rakuten) = &self.rakuten
            && !rakuten.credentials.is_complete()
        {
            bail!("rakuten: username and password are required");
        }
        if let Some(sbi) = &self.sbi
            && !sbi.credentials.is_complete()
        {
            bail!("sbi: username and password are required");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }
}
