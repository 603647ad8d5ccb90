//! # Client Configuration
//!
//! Configuration for the portal client. Values come from environment
//! variables (a `.env` file is honoured) with local-development defaults.

use rent_core::{PollPolicy, PortalError, PortalResult};
use reqwest::Url;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_CSRF_COOKIE: &str = "csrftoken";
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRFToken";
pub const DEFAULT_LOGIN_URL: &str = "/";

/// Portal client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base origin, including any path prefix (e.g. `https://portal.example/api`)
    pub api_base_url: String,

    /// Cookie the backend stores the CSRF token in
    pub csrf_cookie_name: String,

    /// Header the CSRF token is sent back in
    pub csrf_header: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Status polling cadence and ceiling
    pub poll: PollPolicy,

    /// Authentication entry point to redirect to on session expiry
    pub login_url: String,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognised env vars (all optional):
    /// - `RENT_API_BASE_URL`
    /// - `RENT_CSRF_COOKIE`
    /// - `RENT_REQUEST_TIMEOUT_SECS`
    /// - `RENT_POLL_INTERVAL_SECS`
    /// - `RENT_POLL_MAX_ATTEMPTS`
    /// - `RENT_LOGIN_URL`
    pub fn from_env() -> PortalResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> PortalResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup("RENT_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        );

        if let Some(name) = lookup("RENT_CSRF_COOKIE") {
            config.csrf_cookie_name = name;
        }

        if let Some(secs) = lookup("RENT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_number("RENT_REQUEST_TIMEOUT_SECS", &secs)?);
        }

        if let Some(secs) = lookup("RENT_POLL_INTERVAL_SECS") {
            config.poll.interval = Duration::from_secs(parse_number("RENT_POLL_INTERVAL_SECS", &secs)?);
        }

        if let Some(attempts) = lookup("RENT_POLL_MAX_ATTEMPTS") {
            config.poll.max_attempts = parse_number("RENT_POLL_MAX_ATTEMPTS", &attempts)?;
        }

        if let Some(url) = lookup("RENT_LOGIN_URL") {
            config.login_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create config with an explicit base URL and defaults for the rest
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }

    /// Check the base URL is an absolute http(s) URL and the poll policy is usable
    pub fn validate(&self) -> PortalResult<()> {
        let url = self.base_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PortalError::Configuration(format!(
                "RENT_API_BASE_URL must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.poll.interval.is_zero() {
            return Err(PortalError::Configuration(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        if self.poll.max_attempts == 0 {
            return Err(PortalError::Configuration(
                "Poll attempts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed base URL (the origin cookies are scoped to)
    pub fn base_url(&self) -> PortalResult<Url> {
        Url::parse(&self.api_base_url).map_err(|e| {
            PortalError::Configuration(format!(
                "Invalid API base URL {}: {}",
                self.api_base_url, e
            ))
        })
    }

    /// Absolute URL for an API path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    /// Builder: set a custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: set the poll policy
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Builder: set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> PortalResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PortalError::Configuration(format!("{} must be a number, got {:?}", key, value)))
}
