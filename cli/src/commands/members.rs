//! Member roster commands

use hub_common::MemberId;
use hub_netsync::{MemberDirectory, MemberProfile};
use serde::Serialize;
use tabled::Tabled;

use super::Outcome;
use crate::config::HubConfig;
use crate::directory::{BillingMemberDirectory, MemberRecord};
use crate::output::OutputFormat;
use crate::store::Hub;
use crate::MemberCommands;

#[derive(Tabled, Serialize)]
struct MemberRow {
    id: String,
    code: String,
    name: String,
    phone: String,
    subscriptions: String,
    access: String,
}

impl From<MemberProfile> for MemberRow {
    fn from(profile: MemberProfile) -> Self {
        let access = format!("{:?}", profile.desired_access()).to_lowercase();
        let subscriptions = profile
            .statuses
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: profile.id.to_string(),
            code: profile.member_code.unwrap_or_default(),
            name: profile.name,
            phone: profile.phone.unwrap_or_default(),
            subscriptions,
            access,
        }
    }
}

pub fn handle(action: MemberCommands, config: &HubConfig, format: OutputFormat) -> anyhow::Result<Outcome> {
    let hub = Hub::load(config.state_path())?;
    match action {
        MemberCommands::Add {
            name,
            code,
            email,
            phone,
        } => {
            anyhow::ensure!(!name.trim().is_empty(), "member name is required");
            let record = MemberRecord {
                member_code: code,
                email,
                phone,
                ..MemberRecord::new(MemberId::new(), name.trim())
            };
            hub.roster.upsert(record.clone());
            hub.save()?;
            tracing::info!(member_id = %record.id, "member added");
            format.summary(
                "Member added",
                &record,
                vec![("id", record.id.to_string()), ("name", record.name.clone())],
            );
        }
        MemberCommands::List => {
            let directory = BillingMemberDirectory::new(hub.roster.clone(), hub.subscriptions.clone());
            let members = directory.members()?;
            format.rows(members.into_iter().map(MemberRow::from).collect());
        }
    }
    Ok(Outcome::Success)
}
