//! `sync-log`: network sync audit trail

use hub_common::MemberId;
use hub_events::{JsonlSyncLogStore, NetworkSyncLog, SyncLogQuery, SyncLogStore, SyncStatus};
use serde::Serialize;
use tabled::Tabled;

use super::Outcome;
use crate::config::HubConfig;
use crate::output::{verdict, OutputFormat};

#[derive(Tabled, Serialize)]
struct LogRow {
    at: String,
    member: String,
    action: String,
    status: String,
    router: String,
    error: String,
}

impl From<NetworkSyncLog> for LogRow {
    fn from(entry: NetworkSyncLog) -> Self {
        let ok = entry.is_success();
        Self {
            at: entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            member: entry.member_id.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
            action: entry.action.to_string(),
            status: verdict(ok, &entry.status.to_string()).to_string(),
            router: entry.router_ip.unwrap_or_else(|| "-".to_string()),
            error: entry.error_message.unwrap_or_default(),
        }
    }
}

pub fn handle(
    config: &HubConfig,
    member: Option<MemberId>,
    failed: bool,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<Outcome> {
    let store = JsonlSyncLogStore::new(config.sync_log_path());
    let query = SyncLogQuery {
        member_id: member,
        status: failed.then_some(SyncStatus::Failed),
        limit: Some(limit),
        ..SyncLogQuery::default()
    };
    let entries = store.query(&query)?;

    match format {
        OutputFormat::Json => format.print(&entries),
        OutputFormat::Table => format.rows(entries.into_iter().map(LogRow::from).collect()),
    }
    Ok(Outcome::Success)
}
