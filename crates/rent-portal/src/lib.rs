//! # rent-portal
//!
//! Terminal front end for the tenant portal client.
//!
//! This crate provides:
//! - `Portal`, the composition root that wires transport, session guard,
//!   payment orchestrator and portal API together
//! - `TerminalPresenter`, which renders payment progress and tracks whether
//!   a new payment may be submitted
//! - `Navigator`, the redirect seam (login page, payment history)

pub mod presenter;
pub mod state;

pub use presenter::{LogNavigator, Navigator, SharedBuffer, TerminalPresenter};
pub use state::{Portal, PortalConfig, COMPLETED_REDIRECT_DELAY, PAYMENT_HISTORY_PATH, SESSION_EXPIRED_MESSAGE};
