//! # rent-client
//!
//! HTTP transport and M-Pesa payment orchestration for the rent-portal client.
//!
//! This crate provides:
//! - **HttpTransport** - reqwest `Transport` with a shared cookie jar
//! - **CookieSessionGuard** - reads the CSRF token from that jar
//! - **PaymentOrchestrator** - STK push submit, bounded status polling,
//!   one terminal transition per cycle
//! - **PortalApi** - the portal's other authenticated operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rent_client::{ClientConfig, CookieSessionGuard, HttpTransport, LoggingObserver, PaymentOrchestrator};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::from_env()?;
//! let transport = HttpTransport::new(config.clone())?;
//! let guard = CookieSessionGuard::new(transport.jar(), &config)?;
//!
//! let orchestrator = PaymentOrchestrator::new(Arc::new(transport), Arc::new(guard), config.poll)
//!     .with_observer(Arc::new(LoggingObserver));
//!
//! // Returns once the gateway accepts the push; the outcome arrives via observers.
//! let checkout = orchestrator.submit(amount, "0712 345 678").await?;
//! ```

pub mod api;
pub mod config;
pub mod http;
pub mod observer;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use api::PortalApi;
pub use config::ClientConfig;
pub use http::HttpTransport;
pub use observer::{dispatch_status_update, BoxedPaymentObserver, LoggingObserver, PaymentObserver};
pub use orchestrator::{PaymentCycle, PaymentOrchestrator, INITIATE_PUSH_PATH};
pub use session::{CookieSessionGuard, SESSION_REDIRECT_DELAY};
