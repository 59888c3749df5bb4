//! Sequential per-period invoice numbers
//!
//! Numbers look like `INV-202610-0007`: prefix, issue period, and a
//! per-period sequence. Increment-and-read happens under one lock, so
//! concurrent finalizations never share a number.

use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Source of per-period sequence values
pub trait InvoiceNumberSequence: Send + Sync {
    /// Next value for `period` (`YYYYMM`), starting at 1
    fn next(&self, period: &str) -> u64;
}

/// `YYYYMM` period of a date
pub fn period_of(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

/// Render an invoice number
pub fn format_number(prefix: &str, period: &str, seq: u64) -> String {
    format!("{}-{}-{:04}", prefix, period, seq)
}

/// In-memory sequence table
#[derive(Debug, Default)]
pub struct InMemoryInvoiceSequence {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryInvoiceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last issued value per period
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }

    /// Replace all counters
    pub fn restore(&self, counters: BTreeMap<String, u64>) {
        *self.counters.lock() = counters;
    }
}

impl InvoiceNumberSequence for InMemoryInvoiceSequence {
    fn next(&self, period: &str) -> u64 {
        let mut counters = self.counters.lock();
        let counter = counters.entry(period.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}
