//! # Payment Confirmation Orchestrator
//!
//! Owns the M-Pesa push-payment lifecycle for one client:
//! submit → acknowledge → poll → terminal resolution.
//!
//! Each `submit` opens a new cycle with a fresh id. The poll loop for a cycle
//! runs as one spawned task; starting another cycle or calling `cancel`
//! aborts it. Every transition is committed through a single gate that drops
//! updates from cycles that are no longer current, and drops anything after
//! the cycle's first terminal state. Observers are called after the gate's
//! lock is released.

use crate::observer::BoxedPaymentObserver;
use rent_core::{
    ApiError, AttemptCounter, BoxedSessionGuard, BoxedTransport, CheckoutHandle, PaymentRequest,
    PaymentState, PollOutcome, PollPolicy, PortalError, PortalResult, RequestSpec, StatusUpdate,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Endpoint that initiates the STK push
pub const INITIATE_PUSH_PATH: &str = "/initiate-stk-push/";

/// Acknowledgement code meaning the gateway accepted the push
pub const ACCEPTED_RESPONSE_CODE: &str = "0";

/// A cycle the gateway has accepted and that is now being polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCycle {
    pub id: Uuid,
    pub handle: CheckoutHandle,
}

/// Drives push payments from submission to a single terminal state.
///
/// Cheap to clone; clones share the same cycle.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: BoxedTransport,
    guard: BoxedSessionGuard,
    policy: PollPolicy,
    cycle: Mutex<Cycle>,
    state_tx: watch::Sender<StatusUpdate>,
}

/// State of the current cycle. Only `Inner` touches it.
struct Cycle {
    id: Uuid,
    state: PaymentState,
    handle: Option<CheckoutHandle>,
    poller: Option<JoinHandle<()>>,
    /// Terminal update of the most recently resolved cycle
    resolved: Option<StatusUpdate>,
    observers: Vec<BoxedPaymentObserver>,
}

impl PaymentOrchestrator {
    pub fn new(transport: BoxedTransport, guard: BoxedSessionGuard, policy: PollPolicy) -> Self {
        let (state_tx, _) = watch::channel(StatusUpdate::idle());

        Self {
            inner: Arc::new(Inner {
                transport,
                guard,
                policy,
                cycle: Mutex::new(Cycle {
                    id: Uuid::nil(),
                    state: PaymentState::Idle,
                    handle: None,
                    poller: None,
                    resolved: None,
                    observers: Vec::new(),
                }),
                state_tx,
            }),
        }
    }

    /// Register an observer for every future transition
    pub fn add_observer(&self, observer: BoxedPaymentObserver) {
        self.inner.lock().observers.push(observer);
    }

    /// Builder: register an observer
    pub fn with_observer(self, observer: BoxedPaymentObserver) -> Self {
        self.add_observer(observer);
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.inner.policy
    }

    /// Latest published update. After `cancel` this is the idle update.
    pub fn state(&self) -> StatusUpdate {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch the latest published transition
    pub fn subscribe(&self) -> watch::Receiver<StatusUpdate> {
        self.inner.state_tx.subscribe()
    }

    /// Checkout being polled, if any
    pub fn active_checkout(&self) -> Option<CheckoutHandle> {
        let cycle = self.inner.lock();
        match cycle.state {
            PaymentState::AwaitingConfirmation => cycle.handle.clone(),
            _ => None,
        }
    }

    /// Terminal update of `cycle_id`, if that was the last cycle to resolve
    pub fn resolution(&self, cycle_id: Uuid) -> Option<StatusUpdate> {
        self.inner
            .lock()
            .resolved
            .clone()
            .filter(|update| update.cycle_id == cycle_id)
    }

    /// Start a new payment cycle.
    ///
    /// Any running cycle is cancelled first. Returns once the gateway has
    /// acknowledged the push; the outcome arrives later through observers.
    pub async fn submit(&self, amount: Decimal, raw_phone: &str) -> PortalResult<CheckoutHandle> {
        self.start(amount, raw_phone).await.map(|cycle| cycle.handle)
    }

    /// Like `submit`, but also returns the id the cycle's updates carry
    #[instrument(skip_all, fields(amount = %amount))]
    pub async fn start(&self, amount: Decimal, raw_phone: &str) -> PortalResult<PaymentCycle> {
        let cycle_id = self.inner.begin_cycle();
        self.inner
            .publish(StatusUpdate::new(cycle_id, PaymentState::Submitting));

        match self.inner.initiate(amount, raw_phone).await {
            Ok(handle) => {
                if !self.inner.start_polling(cycle_id, handle.clone()) {
                    debug!(checkout = %handle, "Acknowledgement arrived for a replaced cycle");
                    return Err(PortalError::Superseded);
                }
                Ok(PaymentCycle {
                    id: cycle_id,
                    handle,
                })
            }
            Err(err) => {
                let update = StatusUpdate::new(cycle_id, PaymentState::Failed)
                    .with_reason(err.user_message());
                if !self.inner.publish(update) {
                    return Err(PortalError::Superseded);
                }
                Err(err)
            }
        }
    }

    /// Stop the current cycle without a transition (e.g. navigating away).
    /// Observers are not called; subscribers see the idle update. Responses
    /// still in flight are discarded.
    pub fn cancel(&self) {
        self.inner.cancel_current();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Abort the running poller and open a new cycle
    fn begin_cycle(&self) -> Uuid {
        let mut cycle = self.lock();
        if let Some(poller) = cycle.poller.take() {
            poller.abort();
            info!(previous = %cycle.id, "Cancelled poll loop of previous cycle");
        }

        cycle.id = Uuid::new_v4();
        cycle.state = PaymentState::Idle;
        cycle.handle = None;
        cycle.id
    }

    fn cancel_current(&self) {
        let mut cycle = self.lock();
        if let Some(poller) = cycle.poller.take() {
            poller.abort();
            info!(cycle = %cycle.id, "Cancelled poll loop");
        }

        let unresolved = !cycle.id.is_nil() && !cycle.state.is_terminal();
        cycle.id = Uuid::nil();
        cycle.handle = None;
        if unresolved {
            cycle.state = PaymentState::Idle;
            self.state_tx.send_replace(StatusUpdate::idle());
        }
    }

    fn is_current(&self, cycle_id: Uuid) -> bool {
        self.lock().id == cycle_id
    }

    /// Publish a transition if its cycle is still current and not yet terminal
    fn publish(&self, update: StatusUpdate) -> bool {
        let observers = {
            let mut cycle = self.lock();
            self.commit(&mut cycle, &update)
        };

        match observers {
            Some(observers) => {
                notify(&observers, &update);
                true
            }
            None => false,
        }
    }

    /// Record a transition under the lock. Returns the observers to call once
    /// the lock is released, or `None` if the update was dropped.
    fn commit(&self, cycle: &mut Cycle, update: &StatusUpdate) -> Option<Vec<BoxedPaymentObserver>> {
        if cycle.id != update.cycle_id {
            debug!(stale = %update.cycle_id, state = %update.state, "Discarding update from replaced cycle");
            return None;
        }
        if cycle.state.is_terminal() {
            debug!(cycle = %cycle.id, state = %update.state, "Cycle already resolved");
            return None;
        }

        cycle.state = update.state;
        if update.state.is_terminal() {
            // May be called from the poller itself: detach, don't abort.
            cycle.poller = None;
            cycle.handle = None;
            cycle.resolved = Some(update.clone());
        }

        self.state_tx.send_replace(update.clone());
        Some(cycle.observers.clone())
    }

    /// Send the push request and interpret the acknowledgement
    async fn initiate(&self, amount: Decimal, raw_phone: &str) -> PortalResult<CheckoutHandle> {
        let request = PaymentRequest::new(amount, raw_phone)?;

        let token = self.guard.token().ok_or_else(|| {
            warn!("CSRF token missing, push payment not sent");
            PortalError::MissingToken
        })?;

        let spec = RequestSpec::post(INITIATE_PUSH_PATH)
            .with_json(&request)
            .map_err(|e| PortalError::InvalidRequest(e.to_string()))?
            .with_header(self.guard.header_name(), token);

        debug!(phone = %request.phone_normalized, "Initiating STK push");
        let response = self.transport.send(&spec).await?;

        let ack: PushAcknowledgement = serde_json::from_value(response)
            .map_err(|e| ApiError::decode(format!("Failed to parse push acknowledgement: {}", e)))?;

        let handle = ack.into_handle()?;
        info!(checkout = %handle, "STK push accepted");
        Ok(handle)
    }

    /// Move to `AwaitingConfirmation` and spawn the poll loop, unless the
    /// cycle was replaced while the acknowledgement was in flight.
    fn start_polling(self: &Arc<Self>, cycle_id: Uuid, handle: CheckoutHandle) -> bool {
        let update = StatusUpdate::new(cycle_id, PaymentState::AwaitingConfirmation);
        let observers = {
            let mut cycle = self.lock();
            let Some(observers) = self.commit(&mut cycle, &update) else {
                return false;
            };
            cycle.handle = Some(handle.clone());
            observers
        };
        notify(&observers, &update);

        // An observer may have cancelled or replaced the cycle.
        let mut cycle = self.lock();
        if cycle.id != cycle_id || cycle.state.is_terminal() {
            return false;
        }

        let inner = Arc::clone(self);
        cycle.poller = Some(tokio::spawn(async move {
            inner.poll_loop(cycle_id, handle).await;
        }));
        true
    }

    /// One status check per tick until a terminal status or the ceiling.
    /// Ticks are sequential: the next one is not awaited until the current
    /// response has been handled.
    async fn poll_loop(self: Arc<Self>, cycle_id: Uuid, handle: CheckoutHandle) {
        let mut attempts = AttemptCounter::new(self.policy.max_attempts);
        let mut ticker = time::interval_at(Instant::now() + self.policy.interval, self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let spec = handle.status_request();

        loop {
            ticker.tick().await;
            if !self.is_current(cycle_id) || !attempts.try_increment() {
                return;
            }
            let attempt = attempts.count();

            match self.transport.send(&spec).await {
                Ok(body) => match serde_json::from_value::<StatusResponse>(body) {
                    Ok(status) => {
                        let outcome = status.into_outcome();
                        if let Some(update) = StatusUpdate::from_outcome(cycle_id, &outcome) {
                            self.publish(update);
                            return;
                        }
                        debug!(checkout = %handle, attempt, "Payment still pending");
                    }
                    Err(e) => {
                        warn!(checkout = %handle, attempt, "Unreadable status response: {}", e);
                    }
                },
                Err(e) => {
                    warn!(
                        checkout = %handle,
                        attempt,
                        kind = %e.kind,
                        transient = e.kind.is_retryable(),
                        "Status check failed: {}",
                        e.message
                    );
                }
            }

            if attempts.is_exhausted() {
                info!(checkout = %handle, attempts = attempt, "No final status, giving up");
                self.publish(StatusUpdate::new(cycle_id, PaymentState::TimedOut));
                return;
            }
        }
    }
}

fn notify(observers: &[BoxedPaymentObserver], update: &StatusUpdate) {
    for observer in observers {
        observer.on_transition(update);
    }
}

// =============================================================================
// Gateway API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct PushAcknowledgement {
    #[serde(rename = "ResponseCode", default)]
    response_code: Option<serde_json::Value>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PushAcknowledgement {
    /// The gateway sends the code as a string, but a number is accepted too
    fn code(&self) -> Option<String> {
        match &self.response_code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn into_handle(self) -> PortalResult<CheckoutHandle> {
        let code = self.code();
        match (code.as_deref(), self.checkout_request_id) {
            (Some(ACCEPTED_RESPONSE_CODE), Some(id)) if !id.is_empty() => {
                if let Some(msg) = &self.customer_message {
                    debug!("Gateway says: {}", msg);
                }
                Ok(CheckoutHandle::new(id))
            }
            _ => Err(PortalError::GatewayRejected {
                code: code.unwrap_or_else(|| "unknown".to_string()),
                message: self
                    .error
                    .unwrap_or_else(|| "M-Pesa request failed".to_string()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    receipt: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StatusResponse {
    fn into_outcome(self) -> PollOutcome {
        PollOutcome::from_status(self.status.as_deref().unwrap_or_default(), self.receipt, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::PaymentObserver;
    use crate::testing::{ack_accepted, pending, status, RecordingObserver, ScriptedTransport};
    use rent_core::{ApiErrorKind, StaticSessionGuard};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator(transport: Arc<ScriptedTransport>) -> (PaymentOrchestrator, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let orch = PaymentOrchestrator::new(
            transport,
            Arc::new(StaticSessionGuard::with_token("csrf-tok")),
            PollPolicy::default(),
        )
        .with_observer(observer.clone());
        (orch, observer)
    }

    async fn wait_terminal(orch: &PaymentOrchestrator) -> StatusUpdate {
        let mut rx = orch.subscribe();
        let update = rx.wait_for(|u| u.state.is_terminal()).await.unwrap().clone();
        update
    }

    #[test]
    fn test_acknowledgement_parsing() {
        let ack: PushAcknowledgement =
            serde_json::from_value(json!({"ResponseCode": "0", "CheckoutRequestID": "ws_CO_1"})).unwrap();
        assert_eq!(ack.into_handle().unwrap().checkout_id, "ws_CO_1");

        let ack: PushAcknowledgement =
            serde_json::from_value(json!({"ResponseCode": 0, "CheckoutRequestID": "ws_CO_2"})).unwrap();
        assert!(ack.into_handle().is_ok());

        let ack: PushAcknowledgement = serde_json::from_value(json!({"ResponseCode": "0"})).unwrap();
        assert!(matches!(ack.into_handle(), Err(PortalError::GatewayRejected { .. })));

        let ack: PushAcknowledgement =
            serde_json::from_value(json!({"ResponseCode": "1032", "error": "Request cancelled by user"})).unwrap();
        match ack.into_handle() {
            Err(PortalError::GatewayRejected { code, message }) => {
                assert_eq!(code, "1032");
                assert_eq!(message, "Request cancelled by user");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_sends_normalized_request_with_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.script_statuses("ws_CO_1", vec![Ok(status("COMPLETED", Some("QKX1")))]);
        let (orch, _) = orchestrator(transport.clone());

        orch.submit(dec!(1500), "0712 345 678").await.unwrap();

        let initiate = transport.calls_to(INITIATE_PUSH_PATH);
        assert_eq!(initiate.len(), 1);
        assert_eq!(initiate[0].header("X-CSRFToken"), Some("csrf-tok"));
        assert_eq!(
            initiate[0].body().unwrap(),
            &json!({"amount": "1500", "phone_number": "254712345678"})
        );
        assert_eq!(orch.active_checkout().unwrap().checkout_id, "ws_CO_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_acknowledgement_never_polls() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(json!({"ResponseCode": "1", "error": "Safaricom Rejected"})));
        let (orch, observer) = orchestrator(transport.clone());

        let err = orch.submit(dec!(100), "0712345678").await.unwrap_err();
        assert!(matches!(err, PortalError::GatewayRejected { .. }));

        time::sleep(Duration::from_secs(120)).await;

        assert_eq!(transport.status_calls(), 0);
        assert_eq!(orch.state().state, PaymentState::Failed);
        assert_eq!(orch.state().reason.as_deref(), Some("Safaricom Rejected"));
        assert_eq!(
            observer.states(),
            vec![PaymentState::Submitting, PaymentState::Failed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_on_submit_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Err(ApiError::network("connection refused")));
        let (orch, _) = orchestrator(transport.clone());

        let err = orch.submit(dec!(100), "0712345678").await.unwrap_err();
        assert!(matches!(err, PortalError::Api(ref e) if e.kind == ApiErrorKind::NetworkError));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(orch.state().state, PaymentState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_on_twentieth_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        let mut script: Vec<_> = (0..19).map(|_| Ok(pending())).collect();
        script.push(Ok(status("COMPLETED", Some("QKX20"))));
        transport.script_statuses("ws_CO_1", script);
        let (orch, observer) = orchestrator(transport.clone());

        orch.submit(dec!(2500), "712345678").await.unwrap();
        let update = wait_terminal(&orch).await;

        assert_eq!(update.state, PaymentState::Completed);
        assert_eq!(update.receipt_id.as_deref(), Some("QKX20"));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.status_calls(), 20);
        assert_eq!(observer.terminal_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_twenty_pending() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        let (orch, observer) = orchestrator(transport.clone());

        let started = Instant::now();
        orch.submit(dec!(2500), "0712345678").await.unwrap();
        let update = wait_terminal(&orch).await;

        assert_eq!(update.state, PaymentState::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(60));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.status_calls(), 20);
        assert_eq!(
            observer.states(),
            vec![
                PaymentState::Submitting,
                PaymentState::AwaitingConfirmation,
                PaymentState::TimedOut
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_stops_polling() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.script_statuses(
            "ws_CO_1",
            vec![
                Ok(pending()),
                Ok(json!({"status": "FAILED", "message": "Request cancelled by user"})),
            ],
        );
        let (orch, _) = orchestrator(transport.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        let update = wait_terminal(&orch).await;

        assert_eq!(update.state, PaymentState::Failed);
        assert_eq!(update.reason.as_deref(), Some("Request cancelled by user"));

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.script_statuses(
            "ws_CO_1",
            vec![
                Err(ApiError::network("timed out")),
                Err(ApiError::server(500, "boom")),
                Ok(json!("not an object")),
                Err(ApiError::unauthorized()),
                Ok(status("COMPLETED", Some("QKX5"))),
            ],
        );
        let (orch, observer) = orchestrator(transport.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        let update = wait_terminal(&orch).await;

        assert_eq!(update.state, PaymentState::Completed);
        assert_eq!(transport.status_calls(), 5);
        assert_eq!(observer.terminal_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let orch = PaymentOrchestrator::new(
            transport.clone(),
            Arc::new(StaticSessionGuard::without_token()),
            PollPolicy::default(),
        );

        let err = orch.submit(dec!(100), "0712345678").await.unwrap_err();
        assert!(matches!(err, PortalError::MissingToken));

        time::sleep(Duration::from_secs(60)).await;
        assert!(transport.calls().is_empty());
        assert_eq!(orch.state().state, PaymentState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_cancels_previous_cycle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_old")));
        transport.push_ack(Ok(ack_accepted("ws_CO_new")));
        // The old checkout's first status check is slow and would report success.
        transport.delay_statuses("ws_CO_old", Duration::from_secs(10));
        transport.script_statuses("ws_CO_old", vec![Ok(status("COMPLETED", Some("OLD")))]);
        transport.script_statuses(
            "ws_CO_new",
            vec![Ok(pending()), Ok(status("COMPLETED", Some("NEW")))],
        );
        let (orch, observer) = orchestrator(transport.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        let first_cycle = orch.state().cycle_id;

        // First tick fires at 3s and its response is still in flight at 4s.
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.status_calls_for("ws_CO_old"), 1);

        orch.submit(dec!(100), "0712345678").await.unwrap();
        let second_cycle = orch.state().cycle_id;
        assert_ne!(first_cycle, second_cycle);

        let update = wait_terminal(&orch).await;
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(update.cycle_id, second_cycle);
        assert_eq!(update.receipt_id.as_deref(), Some("NEW"));
        assert_eq!(orch.state().receipt_id.as_deref(), Some("NEW"));
        assert_eq!(transport.status_calls_for("ws_CO_old"), 1);
        assert!(observer
            .updates()
            .iter()
            .all(|u| u.receipt_id.as_deref() != Some("OLD")));
        assert_eq!(observer.terminal_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        let (orch, observer) = orchestrator(transport.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        time::sleep(Duration::from_secs(7)).await;
        assert_eq!(transport.status_calls(), 2);

        orch.cancel();
        time::sleep(Duration::from_secs(120)).await;

        assert_eq!(transport.status_calls(), 2);
        assert_eq!(observer.terminal_count(), 0);
        assert!(orch.active_checkout().is_none());
        assert_eq!(orch.state().state, PaymentState::Idle);
        assert!(orch.state().cycle_id.is_nil());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_resolution_keeps_outcome() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.script_statuses("ws_CO_1", vec![Ok(status("COMPLETED", Some("QKX1")))]);
        let (orch, _) = orchestrator(transport.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        wait_terminal(&orch).await;
        orch.cancel();

        assert_eq!(orch.state().state, PaymentState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_outlives_next_cycle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.push_ack(Ok(ack_accepted("ws_CO_2")));
        transport.script_statuses("ws_CO_1", vec![Ok(status("COMPLETED", Some("QKX1")))]);
        let (orch, _) = orchestrator(transport.clone());

        let first = orch.start(dec!(100), "0712345678").await.unwrap();
        assert_eq!(first.handle.checkout_id, "ws_CO_1");
        wait_terminal(&orch).await;

        let second = orch.start(dec!(100), "0712345678").await.unwrap();
        assert_eq!(orch.state().cycle_id, second.id);

        let resolved = orch.resolution(first.id).unwrap();
        assert_eq!(resolved.state, PaymentState::Completed);
        assert_eq!(resolved.receipt_id.as_deref(), Some("QKX1"));
        assert!(orch.resolution(second.id).is_none());
    }

    /// Calls back into the orchestrator from every transition
    struct ReentrantObserver {
        orch: std::sync::OnceLock<PaymentOrchestrator>,
        seen: Mutex<Vec<(PaymentState, Option<String>)>>,
    }

    impl PaymentObserver for ReentrantObserver {
        fn on_transition(&self, update: &StatusUpdate) {
            if let Some(orch) = self.orch.get() {
                let checkout = orch.active_checkout().map(|h| h.checkout_id);
                assert_eq!(orch.state().state, update.state);
                self.seen.lock().unwrap().push((update.state, checkout));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_may_call_back_into_orchestrator() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(ack_accepted("ws_CO_1")));
        transport.script_statuses("ws_CO_1", vec![Ok(status("COMPLETED", Some("QKX1")))]);

        let observer = Arc::new(ReentrantObserver {
            orch: std::sync::OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        });
        let (orch, _) = orchestrator(transport);
        orch.add_observer(observer.clone());
        let _ = observer.orch.set(orch.clone());

        orch.submit(dec!(100), "0712345678").await.unwrap();
        wait_terminal(&orch).await;

        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec![
                (PaymentState::Submitting, None),
                (PaymentState::AwaitingConfirmation, Some("ws_CO_1".to_string())),
                (PaymentState::Completed, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_cycle_after_terminal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ack(Ok(json!({"ResponseCode": "1", "error": "Safaricom Rejected"})));
        transport.push_ack(Ok(ack_accepted("ws_CO_2")));
        transport.script_statuses("ws_CO_2", vec![Ok(status("COMPLETED", Some("QKX2")))]);
        let (orch, observer) = orchestrator(transport.clone());

        assert!(orch.submit(dec!(100), "0712345678").await.is_err());
        orch.submit(dec!(100), "0712345678").await.unwrap();
        let update = wait_terminal(&orch).await;

        assert_eq!(update.state, PaymentState::Completed);
        assert_eq!(
            observer.states(),
            vec![
                PaymentState::Submitting,
                PaymentState::Failed,
                PaymentState::Submitting,
                PaymentState::AwaitingConfirmation,
                PaymentState::Completed
            ]
        );
    }
}
