//! `confirm-payment`: gateway confirmation entry point

use hub_billing::PaymentCompleted;
use hub_common::{EntityKind, EntityRef};
use uuid::Uuid;

use super::{Outcome, Runtime};
use crate::config::HubConfig;
use crate::output::{verdict, OutputFormat};
use crate::PayableKind;

pub async fn handle(
    config: HubConfig,
    kind: PayableKind,
    id: Uuid,
    reference: Option<String>,
    gateway: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<Outcome> {
    let kind = match kind {
        PayableKind::Invoice => EntityKind::Invoice,
        PayableKind::Subscription => EntityKind::Subscription,
        PayableKind::Booking => EntityKind::Booking,
    };
    let payment = PaymentCompleted {
        payable: EntityRef::new(kind, id),
        reference,
        gateway,
    };

    let runtime = Runtime::start(config)?;
    let result = runtime.engine.payments().handle(&payment);
    runtime.finish().await?;
    let outcome = result?;

    let mut fields = vec![("payable", payment.payable.to_string())];
    if let Some(invoice) = &outcome.invoice {
        fields.push(("invoice status", invoice.status.to_string()));
    }
    if outcome.already_paid {
        fields.push(("note", "already paid, nothing changed".to_string()));
    }
    if let Some(sub) = &outcome.subscription {
        fields.push(("subscription", format!("{} {} until {}", sub.id, sub.status, sub.end_date)));
    }
    if let Some(error) = &outcome.follow_up_error {
        fields.push(("follow-up", verdict(false, error).to_string()));
    }
    let ok = outcome.follow_up_error.is_none();
    format.summary(&verdict(ok, "Payment confirmed").to_string(), &outcome, fields);
    Ok(Outcome::from_success(ok))
}
