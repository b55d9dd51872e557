//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request log middleware produces:
//!     → record.rs (LogRecord: one structured entry per request)
//!     → sink.rs (LogSink: tracing events, JSON lines or memory)
//!
//! Process diagnostics:
//!     → logging.rs (tracing subscriber: level filter, JSON or pretty output)
//! ```
//!
//! # Design Decisions
//! - Record field names are a compatibility contract with log consumers
//! - Request ID flows from the request context into every record
//! - Emission never fails the request; backend faults are logged instead

pub mod logging;
pub mod record;
pub mod sink;

pub use record::{Category, ExternalRecord, LogRecord, RecordError};
pub use sink::{CapturedLog, JsonSink, LogSink, Logger, MemorySink, Severity, TracingSink};
