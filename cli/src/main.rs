//! HubSpace operator CLI
//!
//! Scheduled triggers, router reconciliation, sync audit and the long-running
//! worker for the coworking platform.
//!
//! # Usage
//!
//! ```bash
//! hubctl process-lifecycle
//! hubctl process-lifecycle --as-of 2026-11-01 --format json
//! hubctl sync-members --dry-run
//! hubctl sync-log --failed --limit 20
//! echo "$ROUTER_PASSWORD" | hubctl settings encrypt-password
//! hubctl run
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use hub_common::{InvoiceId, MemberId, SubscriptionId};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod commands;
mod config;
mod directory;
mod output;
mod store;

use commands::Outcome;
use config::{HubConfig, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "hubctl")]
#[command(version)]
#[command(about = "HubSpace operator CLI", long_about = None)]
struct Cli {
    /// Config file
    #[arg(long, short, env = "HUB_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    format: output::OutputFormat,

    /// Log line format on stderr
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the subscription and overdue-invoice sweeps
    ProcessLifecycle {
        /// Evaluate as of this date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Reconcile every member's hotspot account with the router
    SyncMembers {
        /// Report intended actions without calling the router
        #[arg(long)]
        dry_run: bool,
    },
    /// Reconcile one member
    SyncMember { id: MemberId },
    /// Router identity and online users
    RouterStatus,
    /// Network sync audit trail, newest first
    SyncLog {
        #[arg(long)]
        member: Option<MemberId>,
        /// Failed attempts only
        #[arg(long)]
        failed: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Apply a gateway payment confirmation
    ConfirmPayment {
        kind: PayableKind,
        id: Uuid,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        gateway: Option<String>,
    },
    /// Manage members
    Members {
        #[command(subcommand)]
        action: MemberCommands,
    },
    /// Manage plans
    Plans {
        #[command(subcommand)]
        action: PlanCommands,
    },
    /// Manage subscriptions
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionCommands,
    },
    /// Manage invoices
    Invoices {
        #[command(subcommand)]
        action: InvoiceCommands,
    },
    /// Router credential helpers
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },
    /// Run sweeps on a schedule until interrupted
    Run,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PayableKind {
    Invoice,
    Subscription,
    Booking,
}

#[derive(Subcommand)]
enum MemberCommands {
    /// Add a member
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List members with their access state
    List,
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Add or update a plan
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value = "NGN")]
        currency: String,
        #[arg(long, conflicts_with = "months")]
        days: Option<u32>,
        #[arg(long)]
        months: Option<u32>,
        #[arg(long, default_value_t = 0)]
        grace_days: u32,
        /// Percent; defaults to the configured rate
        #[arg(long)]
        tax_rate: Option<Decimal>,
    },
    /// List plans
    List,
}

#[derive(Subcommand)]
enum SubscriptionCommands {
    /// Subscribe a member to a plan (starts pending)
    Create {
        #[arg(long)]
        member: MemberId,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        no_auto_renew: bool,
        /// Also issue the first invoice
        #[arg(long)]
        invoice: bool,
    },
    /// Activate a pending subscription
    Activate { id: SubscriptionId },
    /// Cancel a subscription
    Cancel {
        id: SubscriptionId,
        #[arg(long)]
        reason: String,
    },
    /// Suspend a subscription
    Suspend {
        id: SubscriptionId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Start a new period on the plan's current terms
    Renew { id: SubscriptionId },
    /// List subscriptions
    List {
        #[arg(long)]
        member: Option<MemberId>,
    },
}

#[derive(Subcommand)]
enum InvoiceCommands {
    /// Create a draft invoice billed to a member
    Draft {
        #[arg(long)]
        member: MemberId,
        #[arg(long)]
        subtotal: Decimal,
        #[arg(long, default_value = "0")]
        discount: Decimal,
        #[arg(long)]
        tax_rate: Option<Decimal>,
        #[arg(long, default_value = "NGN")]
        currency: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Draft the invoice for a subscription period
    DraftFor { subscription: SubscriptionId },
    /// Number and send a draft
    Finalize { id: InvoiceId },
    /// Void an invoice
    Void {
        id: InvoiceId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Record a full or partial payment
    RecordPayment {
        id: InvoiceId,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        gateway: Option<String>,
    },
    /// List invoices with their effective status
    List {
        #[arg(long)]
        member: Option<MemberId>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Encrypt a router password read from stdin
    EncryptPassword,
    /// Generate a new master key
    GenerateKey,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match dispatch(cli).await {
        Ok(Outcome::Locked) => {
            eprintln!("another run of this job is in progress, skipped");
            Outcome::Locked.exit_code()
        }
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<Outcome> {
    let format = cli.format;
    if let Commands::Settings { action } = cli.command {
        return commands::settings::handle(action);
    }
    let config = HubConfig::load(&cli.config)?;

    match cli.command {
        Commands::ProcessLifecycle { as_of } => commands::lifecycle::handle(config, as_of, format).await,
        Commands::SyncMembers { dry_run } => commands::sync::members(config, dry_run, format).await,
        Commands::SyncMember { id } => commands::sync::member(config, id, format).await,
        Commands::RouterStatus => commands::sync::status(config, format).await,
        Commands::SyncLog { member, failed, limit } => {
            commands::sync_log::handle(&config, member, failed, limit, format)
        }
        Commands::ConfirmPayment {
            kind,
            id,
            reference,
            gateway,
        } => commands::payments::handle(config, kind, id, reference, gateway, format).await,
        Commands::Members { action } => commands::members::handle(action, &config, format),
        Commands::Plans { action } => commands::plans::handle(action, &config, format),
        Commands::Subscriptions { action } => commands::subscriptions::handle(action, config, format).await,
        Commands::Invoices { action } => commands::invoices::handle(action, config, format).await,
        Commands::Settings { action } => commands::settings::handle(action),
        Commands::Run => commands::worker::run(config, cli.config).await,
    }
}
