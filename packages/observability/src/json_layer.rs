//! JSON layer for structured logging.
//!
//! Each tracing event becomes one JSON object per line with:
//! - timestamp (RFC 3339)
//! - level
//! - service (from LogConfig)
//! - pid
//! - target (module path)
//! - message
//! - fields (structured key-value pairs)

use crate::ObservabilityMode;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// A single structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9._%+\-])[A-Za-z0-9._%+\-]*@([A-Za-z0-9.\-]+\.[A-Za-z]{2,})")
            .expect("static email pattern")
    })
}

/// Mask the local part of every email address in `input`, keeping its first
/// character and the domain (`jane@x.com` becomes `j***@x.com`).
pub fn redact_emails(input: &str) -> String {
    email_pattern().replace_all(input, "$1***@$2").into_owned()
}

/// Visitor that extracts fields from tracing events.
struct FieldVisitor {
    fields: HashMap<String, serde_json::Value>,
    message: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            fields: HashMap::new(),
            message: None,
        }
    }

    fn insert_string(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert_string(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert_string(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert_string(field, value.to_string());
    }
}

/// Layer that writes one JSON object per event.
pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    make_writer: W,
    mode: ObservabilityMode,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W, mode: ObservabilityMode) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
            make_writer,
            mode,
        }
    }

    fn build_entry(&self, level: Level, target: &str, visitor: FieldVisitor, span: Option<String>) -> LogEntry {
        let mut message = visitor.message.unwrap_or_default();
        let mut fields = visitor.fields;

        if self.mode == ObservabilityMode::ProdMetadataOnly {
            message = redact_emails(&message);
            for value in fields.values_mut() {
                if let serde_json::Value::String(s) = value {
                    *s = redact_emails(s);
                }
            }
        }

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            level: level.as_str().to_string(),
            service: self.service_name.clone(),
            pid: self.pid,
            target: target.to_string(),
            message,
            fields,
            span,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let span_name = ctx.event_span(event).map(|s| s.name().to_string());
        let metadata = event.metadata();
        let entry = self.build_entry(*metadata.level(), metadata.target(), visitor, span_name);

        if let Ok(json) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{}", json);
        }
    }
}
