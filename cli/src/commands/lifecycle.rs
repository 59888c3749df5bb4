//! `process-lifecycle`: scheduled subscription and invoice sweeps

use chrono::NaiveDate;
use hub_billing::LifecycleRunReport;
use hub_common::{Clock, ManualClock, SystemClock, LIFECYCLE_JOB};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{lock, Outcome, Runtime};
use crate::config::HubConfig;
use crate::output::{count, verdict, OutputFormat};

#[derive(Debug, Serialize)]
struct LifecycleSummary {
    #[serde(flatten)]
    report: LifecycleRunReport,
    events: BTreeMap<String, usize>,
}

pub async fn handle(
    config: HubConfig,
    as_of: Option<NaiveDate>,
    format: OutputFormat,
) -> anyhow::Result<Outcome> {
    let clock: Arc<dyn Clock> = match as_of {
        Some(date) => Arc::new(ManualClock::at_date(date)),
        None => Arc::new(SystemClock),
    };
    let Some(_guard) = lock(&config, LIFECYCLE_JOB, config.locks.lifecycle_ttl())? else {
        return Ok(Outcome::Locked);
    };
    let runtime = Runtime::with_clock(config, clock.clone())?;

    let report = runtime.engine.process_lifecycle(clock.now());
    runtime.drain().await;
    let events = runtime.emitted();
    runtime.finish().await?;

    let ok = report.is_success();
    print_report(&LifecycleSummary { report, events }, format);
    Ok(Outcome::from_success(ok))
}

fn print_report(summary: &LifecycleSummary, format: OutputFormat) {
    let report = &summary.report;
    let subs = &report.subscriptions;
    let mut fields = vec![
        ("as of", report.as_of.to_string()),
        ("expiring marked", count(subs.expiring_marked, false)),
        ("expired", count(subs.expired_processed, false)),
        ("grace period started", count(subs.grace_period_started, false)),
        ("grace period expired", count(subs.grace_period_expired, false)),
        ("invoices overdue", count(report.invoices.marked, false)),
        ("conflicts skipped", count(subs.conflicts + report.invoices.conflicts, false)),
        (
            "errors",
            count((subs.errors.len() + report.invoices.errors.len()) as u64, true),
        ),
    ];
    for (name, n) in &summary.events {
        fields.push(("event", format!("{name} x{n}")));
    }
    let title = verdict(report.is_success(), "Lifecycle run").to_string();
    format.summary(&title, summary, fields);

    if let OutputFormat::Table = format {
        for error in subs.errors.iter().chain(&report.invoices.errors) {
            eprintln!("  {}", verdict(false, error));
        }
    }
}
