use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use extwire_frame::{commands, Envelope};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    index: usize,
    command: &'a str,
    kind: &'a str,
    seqno: u64,
    content_size: usize,
    content_hex: String,
}

/// Collects decoded envelopes and renders them in the selected format.
///
/// JSON, pretty and raw output stream one envelope at a time; the table is
/// printed once at the end.
pub struct EnvelopePrinter {
    format: OutputFormat,
    table: Option<Table>,
    printed: usize,
}

impl EnvelopePrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = (format == OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "COMMAND", "KIND", "SEQNO", "SIZE", "CONTENT"]);
            table
        });
        Self {
            format,
            table,
            printed: 0,
        }
    }

    pub fn print(&mut self, envelope: &Envelope) {
        let index = self.printed;
        self.printed += 1;
        let content = envelope.content.as_ref();

        match self.format {
            OutputFormat::Json => {
                let out = EnvelopeOutput {
                    index,
                    command: &envelope.command,
                    kind: command_kind(&envelope.command),
                    seqno: envelope.seqno,
                    content_size: content.len(),
                    content_hex: hex(content),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        index.to_string(),
                        envelope.command.clone(),
                        command_kind(&envelope.command).to_string(),
                        envelope.seqno.to_string(),
                        content.len().to_string(),
                        content_preview(content),
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "#{index} {} seqno={} size={} content={}",
                    envelope.command,
                    envelope.seqno,
                    content.len(),
                    content_preview(content)
                );
            }
            OutputFormat::Raw => print_raw(content),
        }
    }

    pub fn printed(&self) -> usize {
        self.printed
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

/// Print a single value as JSON, a two-column table, or `key: value` lines.
pub fn print_fields(fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let map: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
                .collect();
            println!("{}", serde_json::Value::Object(map));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (k, v) in fields {
                table.add_row(vec![(*k).to_string(), v.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (k, v) in fields {
                println!("{k}: {v}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn command_kind(command: &str) -> &'static str {
    if commands::is_datasource(command) {
        "datasource"
    } else if commands::is_builtin(command) {
        "builtin"
    } else {
        "custom"
    }
}

fn content_preview(content: &[u8]) -> String {
    const MAX_PREVIEW: usize = 48;
    match std::str::from_utf8(content) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c == '\n') => {
            text.chars().take(MAX_PREVIEW).collect()
        }
        _ if content.len() <= MAX_PREVIEW / 2 => hex(content),
        _ => format!("<binary {} bytes>", content.len()),
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
