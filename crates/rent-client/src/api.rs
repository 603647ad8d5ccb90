//! # Portal API
//!
//! The tenant portal's other authenticated operations. Every mutating call
//! checks for a CSRF token before anything is sent.

use rent_core::{
    ApiError, BoxedSessionGuard, BoxedTransport, Complaint, DashboardCounts, MaintenanceRequest,
    PortalError, PortalResult, ProfileUpdate, RequestSpec, TenantProfile,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

pub const PROFILE_PATH: &str = "/profile/";
pub const DASHBOARD_COUNTS_PATH: &str = "/dashboard-counts/";
pub const LOGOUT_PATH: &str = "/logout/";
pub const REQUESTS_PATH: &str = "/requests/";
pub const COMPLAINTS_PATH: &str = "/complaints/";

/// Authenticated portal operations over a shared transport
#[derive(Clone)]
pub struct PortalApi {
    transport: BoxedTransport,
    guard: BoxedSessionGuard,
}

impl PortalApi {
    pub fn new(transport: BoxedTransport, guard: BoxedSessionGuard) -> Self {
        Self { transport, guard }
    }

    /// Verify the session by fetching the profile
    #[instrument(skip(self))]
    pub async fn check_auth(&self) -> PortalResult<TenantProfile> {
        self.get(PROFILE_PATH).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> PortalResult<()> {
        self.send_mutating(RequestSpec::patch(PROFILE_PATH), update)
            .await
            .map(|_| ())
    }

    pub async fn dashboard_counts(&self) -> PortalResult<DashboardCounts> {
        self.get(DASHBOARD_COUNTS_PATH).await
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> PortalResult<()> {
        let token = self.require_token()?;
        let spec = RequestSpec::post(LOGOUT_PATH).with_header(self.guard.header_name(), token);
        self.transport.send(&spec).await?;
        info!("Logged out");
        Ok(())
    }

    #[instrument(skip(self, request), fields(urgency = ?request.urgency))]
    pub async fn submit_maintenance_request(
        &self,
        request: &MaintenanceRequest,
    ) -> PortalResult<serde_json::Value> {
        self.send_mutating(RequestSpec::post(REQUESTS_PATH), request)
            .await
    }

    #[instrument(skip(self, complaint), fields(kind = %complaint.kind))]
    pub async fn submit_complaint(&self, complaint: &Complaint) -> PortalResult<serde_json::Value> {
        self.send_mutating(RequestSpec::post(COMPLAINTS_PATH), complaint)
            .await
    }

    fn require_token(&self) -> PortalResult<String> {
        self.guard.token().ok_or_else(|| {
            warn!("CSRF token missing, request not sent");
            PortalError::MissingToken
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        let body = self.transport.send(&RequestSpec::get(path)).await?;
        serde_json::from_value(body).map_err(|e| {
            PortalError::Api(ApiError::decode(format!("Unexpected response from {}: {}", path, e)))
        })
    }

    async fn send_mutating<B: Serialize>(
        &self,
        spec: RequestSpec,
        body: &B,
    ) -> PortalResult<serde_json::Value> {
        let token = self.require_token()?;
        let spec = spec
            .with_json(body)
            .map_err(|e| PortalError::InvalidRequest(e.to_string()))?
            .with_header(self.guard.header_name(), token);

        debug!(method = %spec.method(), path = %spec.path(), "Sending portal write");
        Ok(self.transport.send(&spec).await?)
    }
}
