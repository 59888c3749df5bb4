//! Plan catalog commands

use hub_billing::{Plan, PlanDuration};
use hub_common::PlanId;
use serde::Serialize;
use tabled::Tabled;

use super::Outcome;
use crate::config::HubConfig;
use crate::output::OutputFormat;
use crate::store::Hub;
use crate::PlanCommands;

#[derive(Tabled, Serialize)]
struct PlanRow {
    id: String,
    name: String,
    price: String,
    duration: String,
    grace: String,
    tax: String,
}

impl From<Plan> for PlanRow {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name,
            price: format!("{} {}", plan.price, plan.currency),
            duration: plan.duration.to_string(),
            grace: format!("{}d", plan.grace_period_days),
            tax: format!("{}%", plan.tax_rate),
        }
    }
}

pub fn handle(action: PlanCommands, config: &HubConfig, format: OutputFormat) -> anyhow::Result<Outcome> {
    let hub = Hub::load(config.state_path())?;
    match action {
        PlanCommands::Add {
            id,
            name,
            price,
            currency,
            days,
            months,
            grace_days,
            tax_rate,
        } => {
            let duration = match (days, months) {
                (Some(d), None) => PlanDuration::Days(d),
                (None, Some(m)) => PlanDuration::Months(m),
                _ => anyhow::bail!("give exactly one of --days or --months"),
            };
            let plan = Plan {
                id: PlanId::new(id)?,
                name,
                price,
                currency: currency.to_uppercase(),
                duration,
                grace_period_days: grace_days,
                tax_rate: tax_rate.unwrap_or(config.lifecycle.default_tax_rate),
            };
            hub.plans.upsert(plan.clone())?;
            hub.save()?;
            tracing::info!(plan_id = %plan.id, "plan saved");
            format.rows(vec![PlanRow::from(plan)]);
        }
        PlanCommands::List => {
            format.rows(hub.plans.plans().into_iter().map(PlanRow::from).collect());
        }
    }
    Ok(Outcome::Success)
}
