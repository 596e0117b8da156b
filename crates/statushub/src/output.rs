//! Output formatting: table or JSON.
//!
//! Tables use `tabled`, structured formats use serde.

use std::io::{self, Write};

use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::recorder::Event;
use crate::scenario::Report;

// ── Rows ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Call")]
    call: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Values")]
    values: String,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            step: event.step,
            source: event.source.label().to_owned(),
            call: event.call.clone(),
            target: event.target.join(", "),
            values: event
                .values
                .iter()
                .map(statushub_core::DataItem::stringify)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Tabled)]
struct KeyValueRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

// ── Render dispatchers ──────────────────────────────────────────────

pub fn render_report(format: OutputFormat, report: &Report) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(render_report_table(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(report)?),
    }
}

/// Render any serializable value as TOML (table format) or JSON.
pub fn render_document<T: Serialize>(format: OutputFormat, data: &T) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(toml::to_string_pretty(data)?),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Table rendering ─────────────────────────────────────────────────

fn render_report_table(report: &Report) -> String {
    let events: Vec<EventRow> = report.events.iter().map(EventRow::from).collect();

    let state = &report.state;
    let mut summary = vec![
        KeyValueRow {
            key: "hub".into(),
            value: report.hub.clone(),
        },
        KeyValueRow {
            key: "steps".into(),
            value: report.steps.to_string(),
        },
    ];
    summary.extend(state.subscriptions.iter().map(|(observer, items)| KeyValueRow {
        key: format!("observer {observer}"),
        value: items.join(", "),
    }));
    summary.extend(state.cached.iter().map(|value| KeyValueRow {
        key: format!("cached {}", value.id()),
        value: value.stringify(),
    }));
    summary.extend(state.active.iter().map(|(item, refs)| KeyValueRow {
        key: format!("active {item}"),
        value: refs.to_string(),
    }));
    if !state.pending_backhaul.is_empty() {
        summary.push(KeyValueRow {
            key: "pending backhaul".into(),
            value: state.pending_backhaul.join(", "),
        });
    }
    summary.push(KeyValueRow {
        key: "index symmetric".into(),
        value: state.symmetric.to_string(),
    });

    format!(
        "{}\n\n{}",
        Table::new(events).with(Style::rounded()),
        Table::new(summary).with(Style::rounded())
    )
}
