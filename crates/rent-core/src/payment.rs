//! # Payment Lifecycle Types
//!
//! Types shared between the payment orchestrator and whatever presents its
//! progress to the user.
//!
//! ```text
//! Idle ──submit──▶ Submitting ──ack "0"──▶ AwaitingConfirmation ──┬─▶ Completed
//!                      │                                          ├─▶ Failed
//!                      └──────────────── any error ──▶ Failed     └─▶ TimedOut
//! ```

use crate::error::{PortalError, PortalResult};
use crate::phone;
use crate::request::RequestSpec;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Seconds between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Status checks per cycle before giving up
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 20;

/// Endpoint reporting the outcome of a push request
pub const STATUS_PATH: &str = "/check-status/";

/// Query parameter carrying the checkout id on status checks
pub const CHECKOUT_ID_PARAM: &str = "checkout_id";

/// A push-payment request, built from user input at submission time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    #[serde(rename = "phone_number")]
    pub phone_normalized: String,
}

impl PaymentRequest {
    /// Normalize the phone and check the amount is payable.
    pub fn new(amount: Decimal, raw_phone: &str) -> PortalResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(PortalError::InvalidRequest(format!(
                "Amount must be greater than zero, got {}",
                amount
            )));
        }

        let phone_normalized = phone::normalize(raw_phone);
        if phone_normalized.is_empty() {
            return Err(PortalError::InvalidRequest(
                "Phone number is required".to_string(),
            ));
        }

        Ok(Self {
            amount,
            phone_normalized,
        })
    }
}

/// Gateway-issued identifier correlating a push request with its outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutHandle {
    pub checkout_id: String,
}

impl CheckoutHandle {
    pub fn new(checkout_id: impl Into<String>) -> Self {
        Self {
            checkout_id: checkout_id.into(),
        }
    }

    /// Status query for this checkout (`GET /check-status/?checkout_id=...`)
    pub fn status_request(&self) -> RequestSpec {
        RequestSpec::get(STATUS_PATH).with_query(CHECKOUT_ID_PARAM, self.checkout_id.as_str())
    }
}

impl std::fmt::Display for CheckoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.checkout_id)
    }
}

/// Result of reducing one status response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Completed { receipt_id: String },
    Failed { reason: String },
    TimedOut,
}

impl PollOutcome {
    /// Reduce a gateway status string. Anything that is not `COMPLETED` or
    /// `FAILED` keeps the cycle waiting.
    pub fn from_status(status: &str, receipt: Option<String>, message: Option<String>) -> Self {
        match status {
            "COMPLETED" => PollOutcome::Completed {
                receipt_id: receipt.unwrap_or_default(),
            },
            "FAILED" => PollOutcome::Failed {
                reason: message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Payment failed or cancelled".to_string()),
            },
            _ => PollOutcome::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollOutcome::Pending)
    }
}

/// Lifecycle state of a payment cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Idle,
    Submitting,
    AwaitingConfirmation,
    Completed,
    Failed,
    TimedOut,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Completed | PaymentState::Failed | PaymentState::TimedOut
        )
    }

    /// Whether the submit control should accept input in this state
    pub fn accepts_submit(&self) -> bool {
        !matches!(
            self,
            PaymentState::Submitting | PaymentState::AwaitingConfirmation
        )
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentState::Idle => "idle",
            PaymentState::Submitting => "submitting",
            PaymentState::AwaitingConfirmation => "awaiting_confirmation",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Notification delivered to observers on every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    /// Which cycle this transition belongs to
    pub cycle_id: Uuid,
    pub state: PaymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(cycle_id: Uuid, state: PaymentState) -> Self {
        Self {
            cycle_id,
            state,
            receipt_id: None,
            reason: None,
            at: Utc::now(),
        }
    }

    /// The state before any cycle has started
    pub fn idle() -> Self {
        Self::new(Uuid::nil(), PaymentState::Idle)
    }

    pub fn with_receipt(mut self, receipt_id: impl Into<String>) -> Self {
        self.receipt_id = Some(receipt_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Build the terminal update for a terminal outcome.
    /// Returns `None` for `Pending`.
    pub fn from_outcome(cycle_id: Uuid, outcome: &PollOutcome) -> Option<Self> {
        match outcome {
            PollOutcome::Pending => None,
            PollOutcome::Completed { receipt_id } => {
                Some(Self::new(cycle_id, PaymentState::Completed).with_receipt(receipt_id.clone()))
            }
            PollOutcome::Failed { reason } => {
                Some(Self::new(cycle_id, PaymentState::Failed).with_reason(reason.clone()))
            }
            PollOutcome::TimedOut => Some(Self::new(cycle_id, PaymentState::TimedOut)),
        }
    }

    /// User-facing status line
    pub fn message(&self) -> String {
        match self.state {
            PaymentState::Idle => String::new(),
            PaymentState::Submitting => "Initiating M-Pesa STK Push...".to_string(),
            PaymentState::AwaitingConfirmation => {
                "Prompt sent! Enter M-Pesa PIN on your phone.".to_string()
            }
            PaymentState::Completed => match &self.receipt_id {
                Some(r) if !r.is_empty() => format!("Payment Successful! Receipt: {}", r),
                _ => "Payment Successful!".to_string(),
            },
            PaymentState::Failed => match &self.reason {
                Some(r) => format!("Payment failed: {}", r),
                None => "Payment Failed or Cancelled.".to_string(),
            },
            PaymentState::TimedOut => {
                "Request timed out. We could not confirm the payment; check your payment history later.".to_string()
            }
        }
    }
}

/// Poll cadence and ceiling for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLL_ATTEMPTS)
    }
}

/// Status checks issued so far in the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    count: u32,
    ceiling: u32,
}

impl AttemptCounter {
    pub fn new(ceiling: u32) -> Self {
        Self { count: 0, ceiling }
    }

    /// Record one attempt. Returns false, without counting, once the
    /// ceiling has been reached.
    pub fn try_increment(&mut self) -> bool {
        if self.count >= self.ceiling {
            return false;
        }
        self.count += 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.ceiling
    }
}
