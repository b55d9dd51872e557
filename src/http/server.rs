//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the application routes
//! - Wire up middleware (request log outermost, then timeout and panic capture)
//! - Bind server to listener with peer address info
//! - Graceful shutdown so in-flight requests finish and get logged

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::middleware::RequestLogLayer;
use crate::observability::Logger;

/// HTTP server hosting the instrumented router.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a server for the bundled routes.
    pub fn new(config: ServiceConfig, logger: Logger) -> Self {
        Self::with_routes(config, logger, handlers::routes())
    }

    /// Create a server for caller-provided routes.
    pub fn with_routes(config: ServiceConfig, logger: Logger, routes: Router) -> Self {
        let router = Self::build_router(&config, logger, routes);
        Self { router, config }
    }

    /// Layer order, outermost first: request log, timeout, panic capture.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, logger: Logger, routes: Router) -> Router {
        routes
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestLogLayer::from_config(&config.request_log, logger))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            seed_request_identity = self.config.request_log.seed_request_identity,
            capture_response_body = self.config.request_log.capture_response_body,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
