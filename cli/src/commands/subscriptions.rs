//! Subscription commands

use hub_billing::{Invoice, Subscription};
use serde::Serialize;
use tabled::Tabled;

use super::{Outcome, Runtime};
use crate::config::HubConfig;
use crate::output::OutputFormat;
use crate::SubscriptionCommands;

#[derive(Tabled, Serialize)]
pub(crate) struct SubscriptionRow {
    id: String,
    member: String,
    plan: String,
    status: String,
    period: String,
    price: String,
    renews: String,
}

impl From<&Subscription> for SubscriptionRow {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            member: sub.member_id.to_string(),
            plan: sub.plan_name.clone(),
            status: sub.status.to_string(),
            period: format!("{} .. {}", sub.start_date, sub.end_date),
            price: format!("{} {}", sub.price_at_subscription, sub.currency),
            renews: sub
                .next_billing_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Serialize)]
struct Created {
    subscription: Subscription,
    invoice: Option<Invoice>,
}

pub async fn handle(
    action: SubscriptionCommands,
    config: HubConfig,
    format: OutputFormat,
) -> anyhow::Result<Outcome> {
    let runtime = Runtime::start(config)?;
    let result = apply(&runtime, action, format);
    runtime.finish().await?;
    result.map(|()| Outcome::Success)
}

fn apply(runtime: &Runtime, action: SubscriptionCommands, format: OutputFormat) -> anyhow::Result<()> {
    let subs = runtime.engine.subscriptions();
    let changed = match action {
        SubscriptionCommands::Create {
            member,
            plan,
            start,
            no_auto_renew,
            invoice,
        } => {
            anyhow::ensure!(
                runtime.hub.roster.get(member).is_some(),
                "member not found: {member}"
            );
            let plan = hub_common::PlanId::new(plan)?;
            let subscription = subs.subscribe(member, &plan, start, !no_auto_renew)?;
            let invoice = if invoice {
                let invoices = runtime.engine.invoices();
                let draft = invoices.invoice_for_subscription(&subscription)?;
                Some(invoices.finalize(draft.id)?)
            } else {
                None
            };
            if let OutputFormat::Json = format {
                format.print(&Created {
                    subscription,
                    invoice,
                });
                return Ok(());
            }
            if let Some(invoice) = &invoice {
                println!(
                    "invoice {} issued for {} {}, due {}",
                    invoice.number.as_deref().unwrap_or("-"),
                    invoice.amounts.total,
                    invoice.currency,
                    invoice.due_date.map(|d| d.to_string()).unwrap_or_default()
                );
            }
            subscription
        }
        SubscriptionCommands::Activate { id } => subs.activate(id)?,
        SubscriptionCommands::Cancel { id, reason } => subs.cancel(id, &reason)?,
        SubscriptionCommands::Suspend { id, reason } => subs.suspend(id, reason.as_deref())?,
        SubscriptionCommands::Renew { id } => subs.renew(id)?,
        SubscriptionCommands::List { member } => {
            let mut all = match member {
                Some(member) => subs.for_member(member),
                None => runtime.hub.subscriptions.snapshot(),
            };
            all.sort_by_key(|s| (s.member_id, s.start_date));
            format.rows(all.iter().map(SubscriptionRow::from).collect());
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => format.print(&changed),
        OutputFormat::Table => format.rows(vec![SubscriptionRow::from(&changed)]),
    }
    Ok(())
}
