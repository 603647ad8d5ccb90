//! # Payment Observers
//!
//! Anything that presents payment progress implements `PaymentObserver`.
//! The orchestrator calls `on_transition` once per state change, in order.

use rent_core::{PaymentState, StatusUpdate};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives payment state transitions.
///
/// Override `on_transition` to see every update, or the per-state hooks for
/// the ones you care about.
#[allow(unused_variables)]
pub trait PaymentObserver: Send + Sync {
    fn on_transition(&self, update: &StatusUpdate) {
        dispatch_status_update(self, update);
    }

    /// Push request is on its way to the gateway
    fn on_submitting(&self, update: &StatusUpdate) {
        debug!(cycle = %update.cycle_id, "Submitting push payment");
    }

    /// Gateway accepted the push; waiting for the PIN
    fn on_awaiting_confirmation(&self, update: &StatusUpdate) {
        info!(cycle = %update.cycle_id, "Awaiting M-Pesa confirmation");
    }

    fn on_completed(&self, update: &StatusUpdate) {
        info!(cycle = %update.cycle_id, receipt = ?update.receipt_id, "Payment completed");
    }

    fn on_failed(&self, update: &StatusUpdate) {
        warn!(cycle = %update.cycle_id, reason = ?update.reason, "Payment failed");
    }

    fn on_timed_out(&self, update: &StatusUpdate) {
        warn!(cycle = %update.cycle_id, "Payment confirmation timed out");
    }
}

/// Type alias for a shared observer
pub type BoxedPaymentObserver = Arc<dyn PaymentObserver>;

/// Default observer (just logs transitions)
pub struct LoggingObserver;

impl PaymentObserver for LoggingObserver {}

/// Route an update to the per-state hook
pub fn dispatch_status_update<O: PaymentObserver + ?Sized>(observer: &O, update: &StatusUpdate) {
    match update.state {
        PaymentState::Idle => {}
        PaymentState::Submitting => observer.on_submitting(update),
        PaymentState::AwaitingConfirmation => observer.on_awaiting_confirmation(update),
        PaymentState::Completed => observer.on_completed(update),
        PaymentState::Failed => observer.on_failed(update),
        PaymentState::TimedOut => observer.on_timed_out(update),
    }
}
