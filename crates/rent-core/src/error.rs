//! # Error Types
//!
//! Typed error handling for the rent-portal client.
//!
//! Two layers:
//! - `ApiError` is what a single transport call produces on failure.
//! - `PortalError` is what call sites (payment submit, portal writes) return,
//!   adding the purely local conditions that never reach the network.

use serde::Deserialize;
use thiserror::Error;

/// Message shown for any malformed or unexpected server response.
pub const GENERIC_SERVER_MESSAGE: &str = "The server returned an unexpected response. Please try again.";

/// Message shown when a mutating call is attempted without a CSRF token.
pub const MISSING_TOKEN_MESSAGE: &str = "Security token missing. Please log in again.";

/// Classification of a failed transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// HTTP 401: the session is no longer valid
    Unauthorized,
    /// HTTP 403: anti-forgery or permission failure
    Forbidden,
    /// Any other non-2xx status
    ServerError,
    /// DNS, connection refused, aborted, timed out
    NetworkError,
    /// 2xx response whose body is not valid JSON
    Decode,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::Forbidden => "forbidden",
            ApiErrorKind::ServerError => "server_error",
            ApiErrorKind::NetworkError => "network_error",
            ApiErrorKind::Decode => "decode",
        }
    }

    /// Only connectivity failures are worth another attempt, and only
    /// inside the poll loop's own cadence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiErrorKind::NetworkError)
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single transport call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub http_status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, "Session expired or not authenticated").with_status(401)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Forbidden, message).with_status(403)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ServerError, message).with_status(status)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NetworkError, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    /// Build a server error from a non-2xx body, preferring the envelope's
    /// `error` field, then `detail`, then a generic status message.
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(ErrorEnvelope::into_message)
            .unwrap_or_else(|| format!("server returned status {}", status));
        Self::server(status, message)
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self.kind {
            ApiErrorKind::Decode => GENERIC_SERVER_MESSAGE.to_string(),
            ApiErrorKind::NetworkError => "Network request failed. Check your connection.".to_string(),
            _ => self.message.clone(),
        }
    }
}

/// The backend's generic error envelope: `{error?, detail?}`
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorEnvelope {
    pub fn into_message(self) -> Option<String> {
        self.error
            .filter(|e| !e.is_empty())
            .or(self.detail.filter(|d| !d.is_empty()))
    }
}

/// Error type returned by every portal call site
#[derive(Debug, Error)]
pub enum PortalError {
    /// Configuration errors (bad base URL, unreadable config file)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input collected from the user
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No CSRF token was available for a mutating call; nothing was sent
    #[error("Security token missing")]
    MissingToken,

    /// The transport call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The gateway answered but did not accept the push request
    #[error("Gateway rejected the request [{code}]: {message}")]
    GatewayRejected { code: String, message: String },

    /// A newer payment cycle replaced this one before it finished
    #[error("Payment cycle superseded by a newer submission")]
    Superseded,
}

impl PortalError {
    /// True exactly when the underlying transport error is `Unauthorized`
    pub fn is_session_expired(&self) -> bool {
        matches!(self, PortalError::Api(e) if e.kind == ApiErrorKind::Unauthorized)
    }

    /// Text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            PortalError::MissingToken => MISSING_TOKEN_MESSAGE.to_string(),
            PortalError::Api(e) => clean_gateway_message(&e.user_message()),
            PortalError::GatewayRejected { message, .. } => clean_gateway_message(message),
            other => other.to_string(),
        }
    }
}

/// The gateway reports an unrecognised subscriber as a literal `None`.
pub fn clean_gateway_message(message: &str) -> String {
    if message.contains("None") {
        "Safaricom rejected the request. Verify your phone number.".to_string()
    } else {
        message.to_string()
    }
}

/// Result type alias for portal operations
pub type PortalResult<T> = Result<T, PortalError>;
