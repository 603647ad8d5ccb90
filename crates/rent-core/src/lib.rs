//! # rent-core
//!
//! Core types and traits for the rent-portal client.
//!
//! This crate provides:
//! - `RequestSpec` and `Method` describing one backend call
//! - `Transport` and `SessionGuard` traits for the shared transport layer
//! - `ApiError` and `PortalError` for typed error handling
//! - `phone::normalize` for M-Pesa phone formatting
//! - Payment lifecycle types (`PaymentState`, `PollOutcome`, `StatusUpdate`, ...)
//! - Payloads for the other tenant portal endpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use rent_core::{RequestSpec, Transport};
//!
//! let spec = RequestSpec::get("/dashboard-counts/");
//! let counts = transport.send(&spec).await?;
//! ```

pub mod error;
pub mod payment;
pub mod phone;
pub mod portal;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use error::{ApiError, ApiErrorKind, ErrorEnvelope, PortalError, PortalResult};
pub use payment::{
    AttemptCounter, CheckoutHandle, PaymentRequest, PaymentState, PollOutcome, PollPolicy,
    StatusUpdate, CHECKOUT_ID_PARAM, STATUS_PATH,
};
pub use portal::{Complaint, DashboardCounts, MaintenanceRequest, ProfileUpdate, TenantProfile, Urgency};
pub use request::{Method, RequestSpec};
pub use transport::{
    ApiResult, BoxedSessionGuard, BoxedTransport, SessionGuard, StaticSessionGuard, Transport,
};
