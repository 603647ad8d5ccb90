//! # rent-pay
//!
//! Pay rent over M-Pesa and use the tenant portal from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Point at the portal backend and a saved session
//! export RENT_API_BASE_URL=http://127.0.0.1:8000/api
//! export RENT_SESSION_FILE=config/portal.toml
//!
//! # Pay rent; approve the prompt on the phone
//! rent-pay pay --amount 15000 --phone "0712 345 678"
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use rent_core::{Complaint, MaintenanceRequest, PaymentState, Urgency};
use rent_portal::{LogNavigator, Portal, PortalConfig, TerminalPresenter};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "rent-pay", version, about = "Tenant portal client with M-Pesa rent payments")]
struct Cli {
    /// Portal API base URL (overrides RENT_API_BASE_URL)
    #[arg(long)]
    api_base_url: Option<String>,

    /// TOML file holding saved session cookies
    #[arg(long)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send an STK push and wait for the payment to resolve
    Pay {
        /// Amount in KES
        #[arg(long)]
        amount: Decimal,
        /// Phone number in any local or international form
        #[arg(long)]
        phone: String,
    },
    /// Show dashboard counters
    Dashboard,
    /// Show the tenant profile
    Profile,
    /// File a complaint
    Complaint {
        /// Category code, e.g. plumbing
        kind: String,
        subject: String,
        description: String,
    },
    /// Request maintenance
    Request {
        subject: String,
        #[arg(long, value_enum, default_value_t = UrgencyArg::Medium)]
        urgency: UrgencyArg,
        description: String,
    },
    /// End the session
    Logout,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UrgencyArg {
    Low,
    Medium,
    High,
}

impl From<UrgencyArg> for Urgency {
    fn from(arg: UrgencyArg) -> Self {
        match arg {
            UrgencyArg::Low => Urgency::Low,
            UrgencyArg::Medium => Urgency::Medium,
            UrgencyArg::High => Urgency::High,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging();

    print_banner();

    let mut config = PortalConfig::from_env(cli.session_file.as_deref())?;
    if let Some(url) = cli.api_base_url {
        config.client = config.client.with_api_base_url(url);
    }

    info!("Environment: {}", config.environment);
    info!("Portal API: {}", config.client.api_base_url);

    let is_prod = config.is_production();
    let presenter = TerminalPresenter::stdout();
    let portal = Portal::new(config, presenter.clone(), Arc::new(LogNavigator))?;

    if !is_prod {
        let policy = portal.orchestrator.policy();
        info!(
            "Status checks every {:?}, up to {} attempts",
            policy.interval, policy.max_attempts
        );
    }

    let ok = match cli.command {
        Command::Pay { amount, phone } => match portal.pay(amount, &phone).await {
            Ok(update) => update.state == PaymentState::Completed,
            Err(_) => false,
        },
        Command::Dashboard => match portal.dashboard().await {
            Ok(counts) => {
                presenter.show_info(&format!("Welcome, {}", counts.username));
                presenter.show_info(&format!("Open complaints: {}", counts.open_complaints));
                presenter.show_info(&format!("Unread notifications: {}", counts.unread_notifications));
                true
            }
            Err(_) => false,
        },
        Command::Profile => match portal.check_auth().await {
            Ok(profile) => {
                println!("{}", serde_json::to_string_pretty(&profile)?);
                true
            }
            Err(_) => false,
        },
        Command::Complaint {
            kind,
            subject,
            description,
        } => portal
            .submit_complaint(&Complaint {
                kind,
                subject,
                description,
            })
            .await
            .is_ok(),
        Command::Request {
            subject,
            urgency,
            description,
        } => portal
            .submit_maintenance_request(&MaintenanceRequest {
                request_subject: subject,
                urgency: urgency.into(),
                description,
            })
            .await
            .is_ok(),
        Command::Logout => portal.logout().await.is_ok(),
    };

    portal.shutdown();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // RENT_LOG_JSON=1 switches to machine-readable output
    if std::env::var("RENT_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn print_banner() {
    println!(
        r#"
  🏠 Rent Portal
  ━━━━━━━━━━━━━━━━━━━━━━━
  M-Pesa rent payments
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
