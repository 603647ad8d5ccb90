//! # Cookie Session Guard
//!
//! Reads the CSRF token the backend set as a cookie, from the same jar the
//! `HttpTransport` sends cookies from.

use crate::config::ClientConfig;
use rent_core::{PortalResult, SessionGuard};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// Delay between showing "session expired" and redirecting to login
pub const SESSION_REDIRECT_DELAY: Duration = Duration::from_secs(2);

/// Session guard backed by the shared cookie jar
pub struct CookieSessionGuard {
    jar: Arc<Jar>,
    origin: Url,
    cookie_name: String,
    header_name: String,
}

impl CookieSessionGuard {
    pub fn new(jar: Arc<Jar>, config: &ClientConfig) -> PortalResult<Self> {
        Ok(Self {
            jar,
            origin: config.base_url()?,
            cookie_name: config.csrf_cookie_name.clone(),
            header_name: config.csrf_header.clone(),
        })
    }
}

impl SessionGuard for CookieSessionGuard {
    fn token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let cookies = header.to_str().ok()?;
        find_cookie(cookies, &self.cookie_name)
    }

    fn header_name(&self) -> &str {
        &self.header_name
    }
}

/// Find a non-empty cookie value in a `Cookie:` header string
pub(crate) fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
