//! HTTP instrumentation subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, graceful shutdown)
//!     → middleware/request_log.rs (arm record, seed context)
//!     → request.rs (snapshot host, target, scheme, peer)
//!     → context.rs (request-scoped identity)
//!     → application handlers (handlers.rs for the bundled service)
//!     → observer.rs (count / capture the response body as it streams)
//!     → one record per request to the logging backend
//! ```

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod observer;
pub mod request;
pub mod server;

pub use context::{RequestContext, RequestContextExt};
pub use middleware::{RequestLogLayer, RequestLogOptions};
pub use observer::{ObservedBody, ResponseObserver};
pub use request::{RemoteAddr, RequestMeta, SecureTransport};
pub use server::HttpServer;
