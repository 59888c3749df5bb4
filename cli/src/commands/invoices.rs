//! Invoice commands

use hub_billing::{DraftInvoice, Invoice, InvoiceStatus};
use hub_common::EntityRef;
use serde::Serialize;
use tabled::Tabled;

use super::{Outcome, Runtime};
use crate::config::HubConfig;
use crate::output::{verdict, OutputFormat};
use crate::InvoiceCommands;

#[derive(Tabled, Serialize)]
struct InvoiceRow {
    id: String,
    number: String,
    billable: String,
    status: String,
    total: String,
    paid: String,
    due: String,
}

impl InvoiceRow {
    fn new(invoice: &Invoice, effective: InvoiceStatus) -> Self {
        let late = effective == InvoiceStatus::Overdue;
        Self {
            id: invoice.id.to_string(),
            number: invoice.number.clone().unwrap_or_else(|| "(draft)".to_string()),
            billable: invoice.billable.to_string(),
            status: verdict(!late, effective.as_str()).to_string(),
            total: format!("{} {}", invoice.amounts.total, invoice.currency),
            paid: invoice.amount_paid.to_string(),
            due: invoice.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn handle(action: InvoiceCommands, config: HubConfig, format: OutputFormat) -> anyhow::Result<Outcome> {
    let runtime = Runtime::start(config)?;
    let result = apply(&runtime, action, format);
    runtime.finish().await?;
    result.map(|()| Outcome::Success)
}

fn apply(runtime: &Runtime, action: InvoiceCommands, format: OutputFormat) -> anyhow::Result<()> {
    let invoices = runtime.engine.invoices();
    let invoice = match action {
        InvoiceCommands::Draft {
            member,
            subtotal,
            discount,
            tax_rate,
            currency,
            description,
        } => {
            anyhow::ensure!(
                runtime.hub.roster.get(member).is_some(),
                "member not found: {member}"
            );
            invoices.create_draft(DraftInvoice {
                billable: EntityRef::member(member),
                origin: None,
                subtotal,
                discount_amount: discount,
                tax_rate,
                currency: currency.to_uppercase(),
                description,
            })?
        }
        InvoiceCommands::DraftFor { subscription } => {
            let subscription = runtime.engine.subscriptions().get(subscription)?;
            invoices.invoice_for_subscription(&subscription)?
        }
        InvoiceCommands::Finalize { id } => invoices.finalize(id)?,
        InvoiceCommands::Void { id, reason } => invoices.void(id, reason)?,
        InvoiceCommands::RecordPayment {
            id,
            amount,
            reference,
            gateway,
        } => invoices.record_payment(id, amount, reference, gateway)?,
        InvoiceCommands::List { member } => {
            let mut all = match member {
                Some(member) => invoices.for_billable(EntityRef::member(member)),
                None => runtime.hub.invoices.snapshot(),
            };
            all.sort_by_key(|i| i.created_at);
            let rows = all
                .iter()
                .map(|i| Ok(InvoiceRow::new(i, invoices.effective_status(i.id)?)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            format.rows(rows);
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => format.print(&invoice),
        OutputFormat::Table => {
            let effective = invoices.effective_status(invoice.id)?;
            format.rows(vec![InvoiceRow::new(&invoice, effective)]);
        }
    }
    Ok(())
}
