//! # Transport and Session Traits
//!
//! The two stateless services every authenticated call goes through.
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   Transport (trait)      │      │   SessionGuard (trait)   │
//! │  └── send(RequestSpec)   │      │  ├── token()             │
//! └────────────▲─────────────┘      │  └── is_session_expired()│
//!              │                    └────────────▲─────────────┘
//!      ┌───────┴───────┐                 ┌───────┴────────────┐
//!      │ HttpTransport │                 │ CookieSessionGuard │
//!      └───────────────┘                 └────────────────────┘
//! ```

use crate::error::{ApiError, ApiErrorKind};
use crate::request::RequestSpec;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one transport call
pub type ApiResult = Result<serde_json::Value, ApiError>;

/// Sends a `RequestSpec` to the backend and classifies the response.
///
/// Implementations never retry, never redirect and hold no payment state.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, spec: &RequestSpec) -> ApiResult;
}

/// Supplies the anti-forgery token for mutating requests.
pub trait SessionGuard: Send + Sync {
    /// Current CSRF token, or `None` when the backend has not set one.
    fn token(&self) -> Option<String>;

    /// Name of the header the token travels in
    fn header_name(&self) -> &str {
        "X-CSRFToken"
    }

    fn is_session_expired(&self, error: &ApiError) -> bool {
        error.kind == ApiErrorKind::Unauthorized
    }
}

/// Type alias for a shared transport (dynamic dispatch)
pub type BoxedTransport = Arc<dyn Transport>;

/// Type alias for a shared session guard (dynamic dispatch)
pub type BoxedSessionGuard = Arc<dyn SessionGuard>;

/// A guard with a fixed token, for callers that obtain the token
/// out of band (and for tests).
#[derive(Debug, Clone, Default)]
pub struct StaticSessionGuard {
    token: Option<String>,
}

impl StaticSessionGuard {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()))
    }

    pub fn without_token() -> Self {
        Self::new(None)
    }
}

impl SessionGuard for StaticSessionGuard {
    fn token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty())
    }
}
