//! Logging backends for structured records.
//!
//! # Responsibilities
//! - Receive finished records at info or error severity
//! - Serialize and route them (tracing events, JSON lines, memory)
//! - Report their own failures without disturbing the caller
//!
//! # Design Decisions
//! - One trait, shared through a cheap `Logger` handle (`Arc` inside)
//! - Sinks are `Send + Sync` and keep no per-request state
//! - Failures go to `tracing::error!`, never back to the HTTP caller

use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::config::{ObservabilityConfig, RecordFormat};
use crate::observability::record::{Category, LogRecord};

/// Target used for request records emitted through `tracing`.
pub const RECORD_TARGET: &str = "request_log";

/// A destination for structured records.
pub trait LogSink: Send + Sync {
    /// Emit `record` at info severity.
    fn emit_info(&self, record: &LogRecord, message: &str);

    /// Emit `record` at error severity.
    fn emit_error(&self, record: &LogRecord, error: &(dyn StdError + 'static));
}

/// Shared handle to a [`LogSink`].
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_arc(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger backed by [`TracingSink`].
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Logger for `format`; JSON lines go to `writer`.
    pub fn for_format<W: Write + Send + 'static>(format: RecordFormat, writer: W) -> Self {
        match format {
            RecordFormat::Json => Self::new(JsonSink::new(writer)),
            RecordFormat::Tracing => Self::tracing(),
        }
    }

    /// Logger selected by `[observability] record_format`, writing to stdout.
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        Self::for_format(config.record_format, io::stdout())
    }

    pub fn info(&self, record: &LogRecord, message: &str) {
        self.sink.emit_info(record, message);
    }

    pub fn error(&self, record: &LogRecord, error: &(dyn StdError + 'static)) {
        self.sink.emit_error(record, error);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Emits one `tracing` event per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn json_or_none(map: &Map<String, Value>) -> Option<String> {
    (!map.is_empty()).then(|| Value::Object(map.clone()).to_string())
}

fn category_name(record: &LogRecord) -> Option<&'static str> {
    record.category.map(|c| match c {
        Category::App => "app",
        Category::Router => "router",
        Category::Usecase => "usecase",
        Category::External => "external",
    })
}

macro_rules! record_event {
    ($level:expr, $record:expr, $message:expr) => {{
        let record: &LogRecord = $record;
        let external = record
            .external
            .as_ref()
            .and_then(|e| serde_json::to_string(e).ok());
        let additional_info = json_or_none(&record.additional_info);
        let stack_trace = record.stack_trace.as_ref().and_then(json_or_none);
        tracing::event!(
            target: RECORD_TARGET,
            $level,
            category = category_name(record),
            service = non_empty(&record.service),
            module = non_empty(&record.module),
            method = non_empty(&record.method),
            duration = (record.duration != 0).then_some(record.duration),
            version = non_empty(&record.version),
            user_id = non_empty(&record.user_id),
            session_id = non_empty(&record.session_id),
            client_id = non_empty(&record.client_id),
            request_id = non_empty(&record.request_id),
            request_name = non_empty(&record.request_name),
            external = external.as_deref(),
            additional_info = additional_info.as_deref(),
            stack_trace = stack_trace.as_deref(),
            "{}",
            $message
        )
    }};
}

impl LogSink for TracingSink {
    fn emit_info(&self, record: &LogRecord, message: &str) {
        record_event!(tracing::Level::INFO, record, message);
    }

    fn emit_error(&self, record: &LogRecord, error: &(dyn StdError + 'static)) {
        record_event!(tracing::Level::ERROR, record, error);
    }
}

/// Writes one JSON object per line: `level`, `msg`, `time` and the record fields.
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_line(&self, level: &str, message_key: &str, message: String, record: &LogRecord) {
        let mut line = match record.to_fields() {
            Ok(fields) => fields,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build log record");
                return;
            }
        };
        line.insert("level".into(), Value::from(level));
        line.insert(message_key.into(), Value::from(message));
        line.insert(
            "time".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut write = || -> io::Result<()> {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            writer.flush()
        };
        if let Err(e) = write() {
            tracing::error!(error = %e, "Failed to write log record");
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> LogSink for JsonSink<W> {
    fn emit_info(&self, record: &LogRecord, message: &str) {
        self.write_line("info", "msg", message.to_string(), record);
    }

    fn emit_error(&self, record: &LogRecord, error: &(dyn StdError + 'static)) {
        self.write_line("error", "error", error.to_string(), record);
    }
}

/// Severity a record was emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A record captured by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub severity: Severity,
    pub message: String,
    pub record: LogRecord,
}

/// Keeps every record in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<CapturedLog> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, severity: Severity, message: String, record: &LogRecord) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedLog {
                severity,
                message,
                record: record.clone(),
            });
    }
}

impl LogSink for MemorySink {
    fn emit_info(&self, record: &LogRecord, message: &str) {
        self.push(Severity::Info, message.to_string(), record);
    }

    fn emit_error(&self, record: &LogRecord, error: &(dyn StdError + 'static)) {
        self.push(Severity::Error, error.to_string(), record);
    }
}
