use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framebridge_frame::{Batch, Envelope, WireFormat};
use serde::Serialize;
use serde_json::Value;

const PREVIEW_LIMIT: usize = 48;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print `value` as one compact JSON line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    schema_id: &'a str,
    role: String,
    format: &'a str,
    domain: &'a str,
    count: usize,
    messages: &'a [Envelope],
}

pub fn print_batch(batch: &Batch, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&BatchOutput {
            schema_id: "https://schemas.3leaps.dev/framebridge/cli/v1/batch-decoded.schema.json",
            role: batch.role.to_string(),
            format: wire_name(batch.format),
            domain: &batch.domain,
            count: batch.messages.len(),
            messages: &batch.messages,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "TYPE", "GUID", "COMMAND", "DATA", "TAG"]);
            for (index, envelope) in batch.messages.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    envelope.kind.as_str().to_string(),
                    envelope
                        .correlation_id
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    envelope.command.clone().unwrap_or_default(),
                    payload_preview(envelope.payload.as_ref()),
                    envelope.tag.clone().unwrap_or_default(),
                ]);
            }
            println!(
                "role={} format={} domain={:?}",
                batch.role,
                wire_name(batch.format),
                batch.domain
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} batch from {} ({} messages, domain {:?})",
                wire_name(batch.format),
                batch.role,
                batch.messages.len(),
                batch.domain
            );
            for envelope in &batch.messages {
                println!("  {}", describe(envelope));
            }
        }
        OutputFormat::Raw => {
            for envelope in &batch.messages {
                print_json(envelope);
            }
        }
    }
}

/// One-line human description of an envelope.
pub fn describe(envelope: &Envelope) -> String {
    let mut line = envelope.kind.as_str().to_string();
    if let Some(command) = &envelope.command {
        line.push(' ');
        line.push_str(command);
    }
    if let Some(id) = &envelope.correlation_id {
        line.push_str(&format!(" guid={id}"));
    }
    if let Some(tag) = &envelope.tag {
        line.push_str(&format!(" tag={tag}"));
    }
    line.push_str(&format!(" data={}", payload_preview(envelope.payload.as_ref())));
    line
}

pub fn wire_name(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Batch => "batch",
        WireFormat::Legacy => "legacy",
    }
}

/// Compact JSON, shortened for table cells. Absent payloads show as `-`.
pub fn payload_preview(payload: Option<&Value>) -> String {
    let Some(payload) = payload else {
        return "-".to_string();
    };
    let text = payload.to_string();
    if text.chars().count() <= PREVIEW_LIMIT {
        return text;
    }
    let mut short: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
    short.push_str("...");
    short
}
