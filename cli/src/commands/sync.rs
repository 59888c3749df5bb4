//! Router reconciliation commands

use hub_common::{MemberId, ROUTER_SYNC_JOB};
use hub_netsync::{PlannedAction, SweepOptions, SweepReport, SyncError};
use serde::Serialize;
use tabled::Tabled;

use super::{lock, Outcome, Runtime};
use crate::config::HubConfig;
use crate::output::{count, verdict, OutputFormat};

#[derive(Tabled, Serialize)]
struct PlannedRow {
    member: String,
    name: String,
    username: String,
    access: String,
}

impl From<&PlannedAction> for PlannedRow {
    fn from(action: &PlannedAction) -> Self {
        Self {
            member: action.member_id.to_string(),
            name: action.member_name.clone(),
            username: action.username.clone().unwrap_or_else(|| "-".to_string()),
            access: format!("{:?}", action.access).to_lowercase(),
        }
    }
}

/// `sync-members`: full reconciliation sweep
pub async fn members(config: HubConfig, dry_run: bool, format: OutputFormat) -> anyhow::Result<Outcome> {
    let Some(_guard) = lock(&config, ROUTER_SYNC_JOB, config.locks.router_sync_ttl())? else {
        return Ok(Outcome::Locked);
    };
    let runtime = Runtime::start(config)?;
    let reconciler = runtime
        .reconciler()
        .with_concurrency(runtime.config.worker.sync_shards);

    let result = reconciler.full_sweep(SweepOptions { dry_run }).await;
    runtime.finish().await?;

    match result {
        Ok(report) => {
            print_sweep(&report, format);
            Ok(Outcome::from_success(report.is_success()))
        }
        Err(SyncError::RouterUnreachable(e)) => {
            eprintln!("{}: {}", verdict(false, "router unreachable"), e);
            Ok(Outcome::Failed)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_sweep(report: &SweepReport, format: OutputFormat) {
    if report.skipped {
        match format {
            OutputFormat::Json => format.print(report),
            OutputFormat::Table => println!("router integration disabled, nothing to sync"),
        }
        return;
    }
    if report.dry_run {
        let rows: Vec<PlannedRow> = report.planned.iter().map(PlannedRow::from).collect();
        match format {
            OutputFormat::Json => format.print(report),
            OutputFormat::Table => format.rows(rows),
        }
        return;
    }

    let title = verdict(report.is_success(), "Router sync").to_string();
    format.summary(
        &title,
        report,
        vec![
            ("enabled", count(report.enabled as u64, false)),
            ("disabled", count(report.disabled as u64, false)),
            ("failed", count(report.failed as u64, true)),
        ],
    );
    if let OutputFormat::Table = format {
        for failure in &report.failures {
            eprintln!("  {} {}", failure.member_id, verdict(false, &failure.error));
        }
    }
}

/// `sync-member`: one member, with retries
pub async fn member(config: HubConfig, id: MemberId, format: OutputFormat) -> anyhow::Result<Outcome> {
    let runtime = Runtime::start(config)?;
    let result = runtime.reconciler().sync_member(id).await;
    runtime.finish().await?;

    match result {
        Ok(outcome) => {
            format.summary(
                &verdict(true, "Member synced").to_string(),
                &outcome,
                vec![
                    ("member", id.to_string()),
                    ("outcome", serde_json::to_string(&outcome)?),
                ],
            );
            Ok(Outcome::Success)
        }
        Err(e @ SyncError::MemberNotFound(_)) => Err(e.into()),
        Err(e) => {
            eprintln!("{}: {}", verdict(false, "sync failed"), e);
            Ok(Outcome::Failed)
        }
    }
}

/// `router-status`: identity and online count
pub async fn status(config: HubConfig, format: OutputFormat) -> anyhow::Result<Outcome> {
    let runtime = Runtime::start(config)?;
    let result = runtime.reconciler().router_status().await;
    runtime.close().await;

    match result {
        Ok(status) => {
            format.summary(
                &verdict(true, "Router online").to_string(),
                &status,
                vec![
                    ("host", status.host.clone()),
                    ("identity", status.identity.clone()),
                    ("online users", status.online_users.to_string()),
                ],
            );
            Ok(Outcome::Success)
        }
        Err(e) => {
            eprintln!("{}: {}", verdict(false, "router unreachable"), e);
            Ok(Outcome::Failed)
        }
    }
}
