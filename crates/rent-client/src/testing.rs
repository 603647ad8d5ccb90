//! Scripted collaborators shared by the unit tests.

use crate::observer::PaymentObserver;
use crate::orchestrator::INITIATE_PUSH_PATH;
use async_trait::async_trait;
use rent_core::{ApiResult, PaymentState, RequestSpec, StatusUpdate, Transport, CHECKOUT_ID_PARAM, STATUS_PATH};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn ack_accepted(checkout_id: &str) -> Value {
    json!({
        "ResponseCode": "0",
        "CustomerMessage": "STK Push initiated successfully",
        "CheckoutRequestID": checkout_id
    })
}

pub fn pending() -> Value {
    json!({"status": "PENDING"})
}

pub fn status(status: &str, receipt: Option<&str>) -> Value {
    match receipt {
        Some(r) => json!({"status": status, "receipt": r}),
        None => json!({"status": status}),
    }
}

/// In-memory transport answering from per-path scripts.
///
/// Push acknowledgements are served in order; status checks are served per
/// checkout id and default to `PENDING` once a script runs out. Any other
/// path answers from `other`, or `{}`.
#[derive(Default)]
pub struct ScriptedTransport {
    acks: Mutex<VecDeque<ApiResult>>,
    statuses: Mutex<HashMap<String, VecDeque<ApiResult>>>,
    delays: Mutex<HashMap<String, Duration>>,
    other: Mutex<HashMap<String, ApiResult>>,
    calls: Mutex<Vec<RequestSpec>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ack(&self, result: ApiResult) {
        self.acks.lock().unwrap().push_back(result);
    }

    pub fn script_statuses(&self, checkout_id: &str, results: Vec<ApiResult>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(checkout_id.to_string(), results.into());
    }

    pub fn delay_statuses(&self, checkout_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(checkout_id.to_string(), delay);
    }

    pub fn respond(&self, path: &str, result: ApiResult) {
        self.other.lock().unwrap().insert(path.to_string(), result);
    }

    pub fn calls(&self) -> Vec<RequestSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RequestSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.path() == path)
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.path() == STATUS_PATH)
            .count()
    }

    /// Status checks made for one checkout id
    pub fn status_calls_for(&self, checkout_id: &str) -> usize {
        self.calls_to(STATUS_PATH)
            .iter()
            .filter(|c| c.query_param(CHECKOUT_ID_PARAM) == Some(checkout_id))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, spec: &RequestSpec) -> ApiResult {
        self.calls.lock().unwrap().push(spec.clone());

        if spec.path() == INITIATE_PUSH_PATH {
            return self
                .acks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"ResponseCode": "1"})));
        }

        if spec.path() == STATUS_PATH {
            let checkout_id = spec.query_param(CHECKOUT_ID_PARAM).unwrap_or_default().to_string();
            let delay = self.delays.lock().unwrap().get(&checkout_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            return self
                .statuses
                .lock()
                .unwrap()
                .get_mut(&checkout_id)
                .and_then(|script| script.pop_front())
                .unwrap_or_else(|| Ok(pending()));
        }

        self.other
            .lock()
            .unwrap()
            .get(spec.path())
            .cloned()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Observer that keeps every update it sees
#[derive(Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingObserver {
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<PaymentState> {
        self.updates().iter().map(|u| u.state).collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.updates()
            .iter()
            .filter(|u| u.state.is_terminal())
            .count()
    }
}

impl PaymentObserver for RecordingObserver {
    fn on_transition(&self, update: &StatusUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}
