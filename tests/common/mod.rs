//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use request_logger::config::ServiceConfig;
use request_logger::lifecycle::Shutdown;
use request_logger::observability::{CapturedLog, Logger, MemorySink};
use request_logger::HttpServer;
use tokio::net::TcpListener;

/// A server running on an ephemeral port, logging into memory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub sink: MemorySink,
    shutdown: Shutdown,
}

impl TestServer {
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until `count` records were emitted, then return them.
    pub async fn wait_for_logs(&self, count: usize) -> Vec<CapturedLog> {
        for _ in 0..100 {
            if self.sink.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let logs = self.sink.logs();
        assert_eq!(logs.len(), count, "unexpected number of records: {logs:#?}");
        logs
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the bundled routes with `config`.
#[allow(dead_code)]
pub async fn start_server(config: ServiceConfig) -> TestServer {
    start(config, None).await
}

/// Start caller-provided routes with `config`.
#[allow(dead_code)]
pub async fn start_with_routes(config: ServiceConfig, routes: Router) -> TestServer {
    start(config, Some(routes)).await
}

/// Serve an already layered router built around `sink`.
#[allow(dead_code)]
pub async fn start_router(router: Router, sink: MemorySink) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await;
    });

    TestServer {
        addr,
        sink,
        shutdown,
    }
}

async fn start(config: ServiceConfig, routes: Option<Router>) -> TestServer {
    let sink = MemorySink::new();
    let logger = Logger::new(sink.clone());
    let server = match routes {
        Some(routes) => HttpServer::with_routes(config, logger, routes),
        None => HttpServer::new(config, logger),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestServer {
        addr,
        sink,
        shutdown,
    }
}
