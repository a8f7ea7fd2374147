//! Gateway configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CREDENTIALS_PATH: &str = ".portal/credentials.json";

pub const REFRESH_PATH: &str = "/user/token-refresh/";
pub const REGISTER_PATH: &str = "/user/register/";
pub const GOOGLE_LOGIN_PATH: &str = "/user/login/google/";

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown PORTAL_SITE: {0} (expected 'customer' or 'admin')")]
    UnknownSite(String),
    #[error("invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// SITE
// =============================================================================

/// Which front end the client acts as. Decides the login endpoint and the
/// screens route guards redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Site {
    #[default]
    Customer,
    Admin,
}

impl Site {
    #[must_use]
    pub fn login_path(self) -> &'static str {
        match self {
            Site::Customer => "/user/login/",
            Site::Admin => "/admin-user/login/",
        }
    }

    /// Where unauthenticated visitors are sent.
    #[must_use]
    pub fn entry_route(self) -> &'static str {
        match self {
            Site::Customer => "/login",
            Site::Admin => "/",
        }
    }

    /// Where authenticated visitors are sent away from login screens.
    #[must_use]
    pub fn dashboard_route(self) -> &'static str {
        match self {
            Site::Customer => "/profile",
            Site::Admin => "/dashboard",
        }
    }
}

impl FromStr for Site {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Site::Customer),
            "admin" => Ok(Site::Admin),
            other => Err(ConfigError::UnknownSite(other.to_owned())),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Backend base URL without a trailing slash.
    pub api_url: String,
    pub site: Site,
    pub timeouts: Timeouts,
    pub credentials_path: PathBuf,
}

impl GatewayConfig {
    /// Config with defaults for everything but the URL and site.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] when `api_url` is not an absolute URL.
    pub fn new(api_url: &str, site: Site) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: normalize_api_url(api_url)?,
            site,
            timeouts: Timeouts::default(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
        })
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PORTAL_API_URL`: default `http://127.0.0.1:8000`
    /// - `PORTAL_SITE`: `customer` (default) or `admin`
    /// - `PORTAL_REQUEST_TIMEOUT_SECS`: default 30
    /// - `PORTAL_CONNECT_TIMEOUT_SECS`: default 10
    /// - `PORTAL_CREDENTIALS_PATH`: default `.portal/credentials.json`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown site or an unparseable URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("PORTAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let site = match std::env::var("PORTAL_SITE") {
            Ok(raw) => raw.parse()?,
            Err(_) => Site::default(),
        };
        let timeouts = Timeouts {
            request_secs: env_parse_u64("PORTAL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("PORTAL_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let credentials_path = std::env::var("PORTAL_CREDENTIALS_PATH")
            .map_or_else(|_| PathBuf::from(DEFAULT_CREDENTIALS_PATH), PathBuf::from);

        Ok(Self { api_url: normalize_api_url(&api_url)?, site, timeouts, credentials_path })
    }

    /// Absolute URL for a backend path such as `/user/login/`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.api_url)
        } else {
            format!("{}/{path}", self.api_url)
        }
    }

    /// Shared HTTP client with the configured timeouts and default headers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClientBuild`] if the TLS backend fails to initialize.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(self.timeouts.connect_secs))
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))
    }
}

fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl { url: raw.to_owned(), reason: e.to_string() })?;
    Ok(trimmed.to_owned())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
