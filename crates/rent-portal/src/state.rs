//! # Portal State
//!
//! Composition root for the client. Builds the transport, session guard,
//! payment orchestrator and portal API once, subscribes the presenter, and
//! turns failures into what the user sees (messages, delayed redirects).

use crate::presenter::{Navigator, TerminalPresenter};
use anyhow::Context;
use rent_client::{
    ClientConfig, CookieSessionGuard, HttpTransport, LoggingObserver, PaymentOrchestrator, PortalApi,
    SESSION_REDIRECT_DELAY,
};
use rent_core::{
    BoxedSessionGuard, BoxedTransport, Complaint, DashboardCounts, MaintenanceRequest, PaymentState,
    PortalError, PortalResult, SessionGuard, StatusUpdate, TenantProfile,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Redirecting to login...";
pub const PAYMENT_HISTORY_PATH: &str = "/payment-history/";

/// Pause on the success message before showing payment history
pub const COMPLETED_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Portal configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Transport and polling configuration
    pub client: ClientConfig,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Cookies restored into the jar at startup (`sessionid`, `csrftoken`)
    pub cookies: BTreeMap<String, String>,
}

impl PortalConfig {
    /// Load from environment variables plus an optional session file
    pub fn from_env(session_file: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let client = ClientConfig::from_env().context("Failed to load client config")?;
        let session_file = session_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("RENT_SESSION_FILE").ok().map(Into::into));

        Ok(Self {
            client,
            environment: std::env::var("RENT_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            cookies: load_session_cookies(session_file.as_deref())?,
        })
    }

    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            environment: "development".to_string(),
            cookies: BTreeMap::new(),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionFile {
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

/// Load saved session cookies from a TOML file.
///
/// An explicit path must exist. Without one, the usual config locations are
/// tried and a missing file just means no saved session.
fn load_session_cookies(explicit: Option<&Path>) -> anyhow::Result<BTreeMap<String, String>> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        return parse_session_file(&content, &path.display().to_string());
    }

    let config_paths = [
        "config/portal.toml",
        "../config/portal.toml",
        "../../config/portal.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            return parse_session_file(&content, path);
        }
    }

    warn!("No session file found, starting without cookies");
    Ok(BTreeMap::new())
}

fn parse_session_file(content: &str, origin: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let file: SessionFile =
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", origin, e))?;
    let cookies: BTreeMap<String, String> = file
        .cookies
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();
    info!("Loaded {} session cookies from {}", cookies.len(), origin);
    Ok(cookies)
}

/// The assembled client
pub struct Portal {
    pub config: PortalConfig,
    pub api: PortalApi,
    pub orchestrator: PaymentOrchestrator,
    guard: BoxedSessionGuard,
    presenter: Arc<TerminalPresenter>,
    navigator: Arc<dyn Navigator>,
}

impl Portal {
    /// Build the HTTP-backed client and restore saved cookies
    pub fn new(
        config: PortalConfig,
        presenter: Arc<TerminalPresenter>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.client.clone())?;
        for (name, value) in &config.cookies {
            transport.seed_cookie(name, value)?;
        }
        let guard = CookieSessionGuard::new(transport.jar(), &config.client)?;

        Ok(Self::from_parts(
            config,
            Arc::new(transport),
            Arc::new(guard),
            presenter,
            navigator,
        ))
    }

    /// Assemble from existing collaborators
    pub fn from_parts(
        config: PortalConfig,
        transport: BoxedTransport,
        guard: BoxedSessionGuard,
        presenter: Arc<TerminalPresenter>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let orchestrator = PaymentOrchestrator::new(transport.clone(), guard.clone(), config.client.poll)
            .with_observer(Arc::new(LoggingObserver))
            .with_observer(presenter.clone());
        let api = PortalApi::new(transport, guard.clone());

        Self {
            config,
            api,
            orchestrator,
            guard,
            presenter,
            navigator,
        }
    }

    /// Pay rent and wait for the cycle to resolve.
    ///
    /// Progress is rendered by the presenter as it happens. A completed
    /// payment moves on to payment history after a short pause. A cycle that
    /// is cancelled or replaced before it resolves ends with `Superseded`.
    pub async fn pay(&self, amount: Decimal, raw_phone: &str) -> PortalResult<StatusUpdate> {
        let mut updates = self.orchestrator.subscribe();

        let cycle = match self.orchestrator.start(amount, raw_phone).await {
            Ok(cycle) => cycle,
            Err(err) => {
                if self.is_session_expired(&err) {
                    self.expire_session().await;
                }
                return Err(err);
            }
        };

        let last = updates
            .wait_for(|u| u.cycle_id != cycle.id || u.state.is_terminal())
            .await
            .map(|u| u.clone())
            .map_err(|_| PortalError::Superseded)?;

        // The watch only holds the latest update, so a terminal state
        // overwritten by the next cycle is looked up instead.
        let update = if last.cycle_id == cycle.id {
            last
        } else {
            self.orchestrator
                .resolution(cycle.id)
                .ok_or(PortalError::Superseded)?
        };

        if update.state == PaymentState::Completed {
            tokio::time::sleep(COMPLETED_REDIRECT_DELAY).await;
            self.navigator.redirect(PAYMENT_HISTORY_PATH);
        }

        Ok(update)
    }

    /// Verify the session; any failure sends the user to login
    pub async fn check_auth(&self) -> PortalResult<TenantProfile> {
        match self.api.check_auth().await {
            Ok(profile) => Ok(profile),
            Err(err) => {
                warn!("Authentication check failed: {}", err);
                self.navigator.redirect(&self.config.client.login_url);
                Err(err)
            }
        }
    }

    pub async fn dashboard(&self) -> PortalResult<DashboardCounts> {
        match self.api.dashboard_counts().await {
            Ok(counts) => Ok(counts),
            Err(err) => {
                self.report_error(&err).await;
                Err(err)
            }
        }
    }

    pub async fn submit_complaint(&self, complaint: &Complaint) -> PortalResult<()> {
        match self.api.submit_complaint(complaint).await {
            Ok(_) => {
                self.presenter
                    .show_success("Complaint submitted successfully! We will review it soon.");
                Ok(())
            }
            Err(err) => {
                self.report_error(&err).await;
                Err(err)
            }
        }
    }

    pub async fn submit_maintenance_request(&self, request: &MaintenanceRequest) -> PortalResult<()> {
        match self.api.submit_maintenance_request(request).await {
            Ok(_) => {
                self.presenter.show_success(
                    "Maintenance request submitted successfully! We will contact you soon.",
                );
                Ok(())
            }
            Err(err) => {
                self.report_error(&err).await;
                Err(err)
            }
        }
    }

    pub async fn logout(&self) -> PortalResult<()> {
        match self.api.logout().await {
            Ok(()) => {
                self.presenter.show_success("Logged out.");
                self.navigator.redirect(&self.config.client.login_url);
                Ok(())
            }
            Err(err) => {
                warn!("Logout failed: {}", err);
                self.presenter
                    .show_error("Logout failed. Server or network issue.");
                Err(err)
            }
        }
    }

    /// Leaving the page: stop any payment polling
    pub fn shutdown(&self) {
        self.orchestrator.cancel();
    }

    /// Show a failure from a portal write or read
    pub async fn report_error(&self, err: &PortalError) {
        match err {
            PortalError::Superseded => {}
            err if self.is_session_expired(err) => self.expire_session().await,
            PortalError::MissingToken => self
                .presenter
                .show_error(&format!("Submission failed: {}", err.user_message())),
            other => self.presenter.show_error(&other.user_message()),
        }
    }

    fn is_session_expired(&self, err: &PortalError) -> bool {
        match err {
            PortalError::Api(api) => self.guard.is_session_expired(api),
            _ => false,
        }
    }

    async fn expire_session(&self) {
        self.presenter.show_error(SESSION_EXPIRED_MESSAGE);
        tokio::time::sleep(SESSION_REDIRECT_DELAY).await;
        self.navigator.redirect(&self.config.client.login_url);
    }
}
