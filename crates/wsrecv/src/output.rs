use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wsrecv_conn::MessageType;
use wsrecv_frame::CloseFrame;

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

#[derive(Serialize)]
struct MessageOutput<'a> {
    schema_id: &'a str,
    kind: MessageType,
    size: usize,
    payload: String,
    source: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct CloseOutput<'a> {
    schema_id: &'a str,
    code: u16,
    code_name: &'a str,
    reason: &'a str,
    source: &'a str,
    timestamp: String,
}

pub fn print_message(kind: MessageType, payload: &[u8], source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: "https://schemas.3leaps.dev/wsrecv/cli/v1/message-received.schema.json",
                kind,
                size: payload.len(),
                payload: payload_preview(kind, payload),
                source,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SIZE", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    kind.to_string(),
                    payload.len().to_string(),
                    source.to_string(),
                    payload_preview(kind, payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} size={} source={} payload={}",
                kind,
                payload.len(),
                source,
                payload_preview(kind, payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_close(frame: &CloseFrame, source: &str, format: OutputFormat) {
    let code_name = frame.code.name().unwrap_or("UNKNOWN");
    match format {
        OutputFormat::Json => {
            let out = CloseOutput {
                schema_id: "https://schemas.3leaps.dev/wsrecv/cli/v1/close-received.schema.json",
                code: frame.code.0,
                code_name,
                reason: &frame.reason,
                source,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CLOSE", "NAME", "SOURCE", "REASON"])
                .add_row(vec![
                    frame.code.0.to_string(),
                    code_name.to_string(),
                    source.to_string(),
                    frame.reason.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "close={} ({}) source={} reason={:?}",
                frame.code.0, code_name, source, frame.reason
            );
        }
        // Raw output carries message payloads only.
        OutputFormat::Raw => {}
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(kind: MessageType, payload: &[u8]) -> String {
    match (kind, std::str::from_utf8(payload)) {
        (MessageType::Text, Ok(text)) => text.to_string(),
        (MessageType::Binary, Ok(text)) if !text.contains(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
