//! Output formatting for CLI commands.
//!
//! This module renders a sync outcome as text with a per-kind table, or as
//! JSON for scripting.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{KindSummary, ResourceKind};
use crate::reconciler::SyncOutcome;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Per-kind row for table display.
#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Resource")]
    kind: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Deleted")]
    deleted: String,
    #[tabled(rename = "Unchanged")]
    unchanged: usize,
    #[tabled(rename = "Refreshed")]
    refreshed: usize,
}

/// JSON shape of an outcome.
#[derive(Serialize)]
struct OutcomeJson<'a> {
    host: Option<&'a str>,
    log_link: &'a str,
    mutations: usize,
    report: BTreeMap<ResourceKind, KindSummary>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a sync outcome for display.
    #[must_use]
    pub fn format_outcome(&self, outcome: &SyncOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = OutcomeJson {
                    host: outcome.host.as_deref(),
                    log_link: &outcome.log_link,
                    mutations: outcome.report.mutations(),
                    report: outcome.report.snapshot(),
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_outcome_text(outcome),
        }
    }

    /// Formats an outcome as text.
    fn format_outcome_text(outcome: &SyncOutcome) -> String {
        let mut output = String::new();

        let snapshot = outcome.report.snapshot();
        if outcome.report.is_noop() {
            let _ = writeln!(
                output,
                "{} No changes required - deployment is up to date.",
                "✓".green()
            );
        } else {
            let _ = writeln!(output, "{} done.", "✓".green());
        }

        if !snapshot.is_empty() {
            let rows: Vec<KindRow> = snapshot
                .iter()
                .map(|(kind, summary)| KindRow {
                    kind: kind.to_string(),
                    created: Self::count(summary.created, |s| s.green().to_string()),
                    updated: Self::count(summary.updated, |s| s.yellow().to_string()),
                    deleted: Self::count(summary.deleted, |s| s.red().to_string()),
                    unchanged: summary.unchanged,
                    refreshed: summary.refreshed,
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if let Some(host) = &outcome.host {
            let _ = write!(output, "\nhosting on {}\n", host.cyan());
        }
        let _ = write!(output, "\nSee logs here: {}\n", outcome.log_link);

        output
    }

    /// Renders a nonzero count through `paint`.
    fn count(value: usize, paint: fn(&str) -> String) -> String {
        let text = value.to_string();
        if value == 0 { text } else { paint(&text) }
    }
}
