//! # HTTP Transport
//!
//! reqwest implementation of `Transport`. One client per transport, sharing a
//! cookie jar with the session guard so the backend's session and CSRF cookies
//! ride along on every request.

use crate::config::ClientConfig;
use async_trait::async_trait;
use rent_core::{ApiError, ApiResult, ErrorEnvelope, Method, PortalError, PortalResult, RequestSpec, Transport};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Transport backed by a reqwest client with a cookie store
pub struct HttpTransport {
    config: ClientConfig,
    client: Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    /// Create a transport with a fresh cookie jar
    pub fn new(config: ClientConfig) -> PortalResult<Self> {
        Self::with_jar(config, Arc::new(Jar::default()))
    }

    /// Create a transport sharing an existing cookie jar
    pub fn with_jar(config: ClientConfig, jar: Arc<Jar>) -> PortalResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PortalError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client, jar })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The cookie jar holding the session and CSRF cookies
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    /// Store a cookie for the API origin (e.g. a session restored from disk)
    pub fn seed_cookie(&self, name: &str, value: &str) -> PortalResult<()> {
        let url = self.config.base_url()?;
        self.jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &url);
        Ok(())
    }

    fn reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        }
    }

    /// Defaults first, then the caller's headers on top
    fn build_headers(spec: &RequestSpec, has_body: bool) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for (name, value) in spec.extra_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::network(format!("Request could not be built: invalid header name {:?}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::network(format!("Request could not be built: invalid value for header {}", name)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, spec), fields(method = %spec.method(), path = %spec.path()))]
    async fn send(&self, spec: &RequestSpec) -> ApiResult {
        let url = self.config.endpoint(spec.path());
        let body = match spec.method() {
            Method::Get => None,
            _ => spec.body(),
        };

        let headers = Self::build_headers(spec, body.is_some())?;

        let mut request = self
            .client
            .request(Self::reqwest_method(spec.method()), &url)
            .headers(headers);

        if !spec.query().is_empty() {
            request = request.query(spec.query());
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(|e| {
            warn!("Request to {} failed: {}", url, e);
            ApiError::network(e.to_string())
        })?;

        let status = response.status();
        debug!("Response status={}", status);

        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::json!({ "success": true }));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::unauthorized());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        classify_response(status.as_u16(), &text)
    }
}

/// Classify a response whose body has been read. 204 and 401 are handled
/// before the body is touched.
pub(crate) fn classify_response(status: u16, body: &str) -> ApiResult {
    match status {
        200..=299 => serde_json::from_str(body)
            .map_err(|e| ApiError::decode(format!("Failed to parse response: {}", e)).with_status(status)),
        401 => Err(ApiError::unauthorized()),
        403 => {
            let message = serde_json::from_str::<ErrorEnvelope>(body)
                .ok()
                .and_then(ErrorEnvelope::into_message)
                .unwrap_or_else(|| "Forbidden: security or permission check failed".to_string());
            Err(ApiError::forbidden(message))
        }
        _ => Err(ApiError::from_error_body(status, body)),
    }
}
