//! Output formatting

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// One line of a key/value summary
#[derive(Tabled)]
struct Field {
    field: String,
    value: String,
}

impl OutputFormat {
    /// Raw data as JSON
    pub fn print<T: Serialize>(&self, data: &T) {
        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
    }

    /// Rows as a table, or the same rows as JSON
    pub fn rows<R: Tabled + Serialize>(&self, rows: Vec<R>) {
        match self {
            OutputFormat::Json => self.print(&rows),
            OutputFormat::Table if rows.is_empty() => println!("{}", "(none)".dimmed()),
            OutputFormat::Table => println!("{}", Table::new(rows).with(Style::rounded())),
        }
    }

    /// Key/value summary in table mode, `data` as JSON otherwise
    pub fn summary<T: Serialize>(&self, title: &str, data: &T, fields: Vec<(&str, String)>) {
        match self {
            OutputFormat::Json => self.print(data),
            OutputFormat::Table => {
                println!("{}", title.bold());
                let rows: Vec<Field> = fields
                    .into_iter()
                    .map(|(field, value)| Field {
                        field: field.to_string(),
                        value,
                    })
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
    }
}

/// Green for success, red otherwise
pub fn verdict(ok: bool, text: &str) -> ColoredString {
    if ok {
        text.green()
    } else {
        text.red()
    }
}

/// Zero counts dimmed, failures highlighted
pub fn count(n: impl Into<u64>, bad: bool) -> String {
    let n = n.into();
    match (n, bad) {
        (0, _) => n.to_string().dimmed().to_string(),
        (_, true) => n.to_string().red().bold().to_string(),
        _ => n.to_string(),
    }
}
