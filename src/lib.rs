//! HTTP request logging middleware.
//!
//! Wraps an axum/tower service, observes each response as it streams out and
//! emits one structured record per request.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use http::{HttpServer, RequestContext, RequestContextExt, RequestLogLayer, RequestLogOptions};
pub use lifecycle::Shutdown;
pub use observability::{LogRecord, LogSink, Logger};
