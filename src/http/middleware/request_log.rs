//! Request logging middleware.
//!
//! Emits exactly one structured record per request, after the response body
//! has been handed to the transport.
//!
//! # Data Flow
//! ```text
//! request ─▶ RequestLogService::call
//!              ├─ snapshot RequestMeta, start clock
//!              ├─ seed request_id / request_name (optional)
//!              ├─ arm RequestLog guard
//!              └─ inner.call(request)
//!                     │ response head
//!                     ▼
//!              ObservedBody(response body, ResponseObserver)
//!                     │ end of stream or drop
//!                     ▼
//!              build_record ─▶ Logger (info for 2xx, error otherwise)
//! ```
//!
//! # Design Decisions
//! - The guard is armed before the downstream service runs; a panic,
//!   a cancelled future or a service error still produces a record (status 500)
//! - The template record is shared read-only and cloned per request
//! - The response head, headers and extensions are never rewritten, so
//!   protocol upgrades work through the layer

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body::Body as HttpBody;
use serde_json::Value;
use thiserror::Error;
use tower::{BoxError, Layer, Service};
use uuid::Uuid;

use crate::config::RequestLogConfig;
use crate::http::context::{RequestContext, RequestContextExt, REQUEST_ID_KEY, REQUEST_NAME_KEY};
use crate::http::observer::{ObservedBody, ResponseObserver};
use crate::http::request::RequestMeta;
use crate::observability::{Category, LogRecord, Logger};

/// Behaviour switches for [`RequestLogLayer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestLogOptions {
    /// Generate `request_id` (UUID v4) and `request_name` (request target)
    /// when the context lacks a non-empty value.
    pub seed_request_identity: bool,
    /// Buffer the response body and log it under `resp_body`.
    pub capture_response_body: bool,
}

/// Error handed to the backend for non-2xx responses; displays the reason phrase.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StatusError(String);

impl StatusError {
    pub fn from_status(status: StatusCode) -> Self {
        Self(status_text(status).to_string())
    }
}

/// Standard reason phrase for `status`.
pub fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Layer that wraps services with [`RequestLogService`].
#[derive(Debug, Clone)]
pub struct RequestLogLayer {
    logger: Logger,
    template: Arc<LogRecord>,
    options: RequestLogOptions,
}

impl RequestLogLayer {
    pub fn new(logger: Logger, template: LogRecord) -> Self {
        Self {
            logger,
            template: Arc::new(template),
            options: RequestLogOptions::default(),
        }
    }

    /// Build the layer from the `[request_log]` config section.
    pub fn from_config(config: &RequestLogConfig, logger: Logger) -> Self {
        Self::new(
            logger,
            LogRecord::template(&config.service, &config.module, &config.version),
        )
        .with_options(RequestLogOptions {
            seed_request_identity: config.seed_request_identity,
            capture_response_body: config.capture_response_body,
        })
    }

    pub fn with_options(mut self, options: RequestLogOptions) -> Self {
        self.options = options;
        self
    }

    pub fn seed_request_identity(mut self, enabled: bool) -> Self {
        self.options.seed_request_identity = enabled;
        self
    }

    pub fn capture_response_body(mut self, enabled: bool) -> Self {
        self.options.capture_response_body = enabled;
        self
    }

    pub fn options(&self) -> RequestLogOptions {
        self.options
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            logger: self.logger.clone(),
            template: self.template.clone(),
            options: self.options,
        }
    }
}

/// Service that logs one record per request handled by `inner`.
#[derive(Debug, Clone)]
pub struct RequestLogService<S> {
    inner: S,
    logger: Logger,
    template: Arc<LogRecord>,
    options: RequestLogOptions,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let started = Instant::now();
        let started_at = Utc::now();
        let meta = RequestMeta::from_request(&request);

        let mut context = request.context();
        if self.options.seed_request_identity {
            context = seed_identity(context, &meta);
            request.set_context(context.clone());
        }

        let log = RequestLog {
            pending: Some(PendingRecord {
                logger: self.logger.clone(),
                template: self.template.clone(),
                meta,
                context,
                started,
                started_at,
                capture_body: self.options.capture_response_body,
            }),
        };

        // Drive the instance that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let future = inner.call(request);

        Box::pin(async move {
            match future.await {
                Ok(response) => Ok(log.observe(response)),
                Err(err) => {
                    drop(log);
                    Err(err)
                }
            }
        })
    }
}

/// Ensure the context carries a non-empty request id and request name.
fn seed_identity(context: RequestContext, meta: &RequestMeta) -> RequestContext {
    let mut context = context;
    if !context.has_value(REQUEST_ID_KEY) {
        context = context.with(REQUEST_ID_KEY, Uuid::new_v4().to_string());
    }
    if !context.has_value(REQUEST_NAME_KEY) {
        context = context.with(REQUEST_NAME_KEY, meta.uri.clone());
    }
    context
}

/// Everything needed to build the record once the response is finished.
struct PendingRecord {
    logger: Logger,
    template: Arc<LogRecord>,
    meta: RequestMeta,
    context: RequestContext,
    started: Instant,
    started_at: DateTime<Utc>,
    capture_body: bool,
}

impl PendingRecord {
    fn finish(self, observer: &ResponseObserver) {
        let record = build_record(
            &self.template,
            &self.meta,
            &self.context,
            self.started_at,
            self.started.elapsed(),
            observer,
        );
        emit(&self.logger, &record, observer.status());
    }
}

/// Completion guard. Emits on drop unless a response took over.
struct RequestLog {
    pending: Option<PendingRecord>,
}

impl RequestLog {
    /// Hand the pending record to an observed response body.
    fn observe<B>(mut self, response: Response<B>) -> Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = response.into_parts();
        let Some(mut pending) = self.pending.take() else {
            return Response::from_parts(parts, Body::new(body));
        };

        if let Some(extra) = parts.extensions.get::<RequestContext>() {
            pending.context = pending.context.overlay(extra);
        }

        let mut observer = ResponseObserver::new(pending.capture_body);
        observer.set_status(parts.status);

        let body = ObservedBody::new(Body::new(body), observer)
            .on_complete(move |observer| pending.finish(observer));
        Response::from_parts(parts, Body::new(body))
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if std::thread::panicking() {
            tracing::warn!(method = %pending.meta.method, uri = %pending.meta.uri, "Handler panicked before responding");
        } else {
            tracing::debug!(method = %pending.meta.method, uri = %pending.meta.uri, "Request ended without a response");
        }
        let mut observer = ResponseObserver::new(false);
        observer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        pending.finish(&observer);
    }
}

/// Assemble the router record for one finished request.
pub fn build_record(
    template: &LogRecord,
    meta: &RequestMeta,
    context: &RequestContext,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    observer: &ResponseObserver,
) -> LogRecord {
    let mut record = template.clone();

    let identity = [
        (context.request_id(), &mut record.request_id),
        (context.request_name(), &mut record.request_name),
        (context.user_id(), &mut record.user_id),
        (context.session_id(), &mut record.session_id),
        (context.client_id(), &mut record.client_id),
    ];
    for (value, field) in identity {
        if let Some(value) = value {
            *field = value.to_string();
        }
    }

    record.category = Some(Category::Router);
    record.duration = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
    record.method = meta.method_label();

    let status = observer.status();
    let info = &mut record.additional_info;
    info.insert("http_host".into(), Value::from(meta.host.clone()));
    info.insert("http_uri".into(), Value::from(meta.uri.clone()));
    info.insert("http_proto".into(), Value::from(meta.proto.clone()));
    info.insert("http_method".into(), Value::from(meta.method.as_str()));
    info.insert("http_scheme".into(), Value::from(meta.scheme));
    info.insert("http_addr".into(), Value::from(meta.addr()));
    info.insert("remote_addr".into(), Value::from(meta.remote_addr.clone()));
    info.insert("user_agent".into(), Value::from(meta.user_agent.clone()));
    info.insert("resp_elapsed_ms".into(), Value::from(format!("{elapsed:?}")));
    info.insert("resp_bytes_length".into(), Value::from(observer.bytes_written()));
    info.insert("resp_status".into(), Value::from(status.as_u16()));
    info.insert(
        "ts".into(),
        Value::from(started_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    if observer.is_capturing() {
        info.insert(
            "resp_body".into(),
            Value::from(String::from_utf8_lossy(observer.body()).into_owned()),
        );
    }

    record
}

/// Route a finished record by status class.
fn emit(logger: &Logger, record: &LogRecord, status: StatusCode) {
    if status.is_success() {
        logger.info(record, status_text(status));
    } else {
        logger.error(record, &StatusError::from_status(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::{CLIENT_ID_KEY, USER_ID_KEY};
    use crate::observability::{CapturedLog, MemorySink, Severity};
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    fn layer(sink: &MemorySink) -> RequestLogLayer {
        RequestLogLayer::new(
            Logger::new(sink.clone()),
            LogRecord::template("orders-api", "http", "1.4.2"),
        )
    }

    async fn respond(status: StatusCode, body: &'static str) -> Result<Response<Body>, Infallible> {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        Ok(response)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Host", "orders.internal")
            .header("User-Agent", "orders-client/1.0")
            .body(Body::empty())
            .unwrap()
    }

    async fn drain(response: Response<Body>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn single(sink: &MemorySink) -> CapturedLog {
        let logs = sink.logs();
        assert_eq!(logs.len(), 1, "expected exactly one record");
        logs.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn health_check_with_implicit_ok() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = svc.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(drain(response).await.is_empty());

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Info);
        assert_eq!(log.message, "OK");
        assert_eq!(log.record.category, Some(Category::Router));
        assert_eq!(log.record.method, "[GET] /health");
        assert_eq!(log.record.service, "orders-api");
        assert_eq!(log.record.version, "1.4.2");
        assert_eq!(log.record.additional_info["resp_status"], 200);
        assert_eq!(log.record.additional_info["resp_bytes_length"], 0);
        assert!(log.record.additional_info.get("resp_body").is_none());
    }

    #[tokio::test]
    async fn created_order_is_info() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| {
            respond(StatusCode::CREATED, "{\"id\":\"ord_001\",\"status\":\"accepted\",\"n\":1}")
        }));

        let request = Request::builder()
            .method("POST")
            .uri("/orders")
            .body(Body::from("{}"))
            .unwrap();
        let response = svc.oneshot(request).await.unwrap();
        assert_eq!(drain(response).await.len(), 42);

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Info);
        assert_eq!(log.message, "Created");
        assert_eq!(log.record.method, "[POST] /orders");
        assert_eq!(log.record.additional_info["resp_status"], 201);
        assert_eq!(log.record.additional_info["resp_bytes_length"], 42);
        assert_eq!(log.record.additional_info["http_method"], "POST");
    }

    #[tokio::test]
    async fn server_error_with_captured_body() {
        let sink = MemorySink::new();
        let svc = layer(&sink)
            .capture_response_body(true)
            .layer(service_fn(|_req: Request<Body>| {
                respond(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }));

        let response = svc.oneshot(get("/orders/7")).await.unwrap();
        assert_eq!(drain(response).await, Bytes::from_static(b"internal error"));

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Error);
        assert_eq!(log.message, "Internal Server Error");
        assert_eq!(log.record.additional_info["resp_body"], "internal error");
        assert_eq!(log.record.additional_info["resp_bytes_length"], 14);
    }

    #[tokio::test]
    async fn not_found_is_error() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| {
            respond(StatusCode::NOT_FOUND, "")
        }));

        drain(svc.oneshot(get("/missing")).await.unwrap()).await;

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Error);
        assert_eq!(log.message, "Not Found");
    }

    #[tokio::test]
    async fn additional_info_fields() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| {
            respond(StatusCode::OK, "pong")
        }));

        drain(svc.oneshot(get("/ping?verbose=1")).await.unwrap()).await;

        let info = single(&sink).record.additional_info;
        assert_eq!(info["http_host"], "orders.internal");
        assert_eq!(info["http_uri"], "/ping?verbose=1");
        assert_eq!(info["http_proto"], "HTTP/1.1");
        assert_eq!(info["http_scheme"], "http");
        assert_eq!(info["http_addr"], "http://orders.internal/ping?verbose=1");
        assert_eq!(info["remote_addr"], "");
        assert_eq!(info["user_agent"], "orders-client/1.0");
        assert!(info["resp_elapsed_ms"].is_string());
        let ts = info["ts"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn context_identity_is_copied() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| {
            respond(StatusCode::OK, "")
        }));

        let mut request = get("/me");
        request.set_context(RequestContext::new().with(USER_ID_KEY, "u1"));
        drain(svc.clone().oneshot(request).await.unwrap()).await;
        drain(svc.oneshot(get("/me")).await.unwrap()).await;

        let logs = sink.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].record.user_id, "u1");
        assert_eq!(logs[1].record.user_id, "");
        assert_eq!(logs[1].record.request_id, "");
    }

    #[tokio::test]
    async fn seeding_generates_unique_ids() {
        let sink = MemorySink::new();
        let svc = layer(&sink)
            .seed_request_identity(true)
            .layer(service_fn(|req: Request<Body>| async move {
                let ctx = req.context();
                let id = ctx.request_id().unwrap_or_default().to_string();
                Ok::<_, Infallible>(Response::new(Body::from(id)))
            }));

        let first = drain(svc.clone().oneshot(get("/a?x=1")).await.unwrap()).await;
        drain(svc.oneshot(get("/b")).await.unwrap()).await;

        let logs = sink.logs();
        let (a, b) = (&logs[0].record, &logs[1].record);
        assert!(Uuid::parse_str(&a.request_id).is_ok());
        assert_ne!(a.request_id, b.request_id);
        // downstream saw the same id that was logged
        assert_eq!(first, Bytes::from(a.request_id.clone()));
        assert_eq!(a.request_name, "/a?x=1");
        assert_eq!(b.request_name, "/b");
    }

    #[tokio::test]
    async fn seeding_keeps_existing_identity() {
        let sink = MemorySink::new();
        let svc = layer(&sink)
            .seed_request_identity(true)
            .layer(service_fn(|_req: Request<Body>| respond(StatusCode::OK, "")));

        let mut request = get("/orders");
        request.set_context(
            RequestContext::new()
                .with(REQUEST_ID_KEY, "req-abc")
                .with(REQUEST_NAME_KEY, "list-orders"),
        );
        drain(svc.clone().oneshot(request).await.unwrap()).await;

        let mut request = get("/orders");
        request.set_context(RequestContext::new().with(REQUEST_ID_KEY, ""));
        drain(svc.clone().oneshot(request).await.unwrap()).await;

        let mut request = get("/orders?page=2");
        request.set_context(
            RequestContext::new()
                .with(REQUEST_ID_KEY, "req-def")
                .with(REQUEST_NAME_KEY, ""),
        );
        drain(svc.oneshot(request).await.unwrap()).await;

        let logs = sink.logs();
        assert_eq!(logs[0].record.request_id, "req-abc");
        assert_eq!(logs[0].record.request_name, "list-orders");
        assert!(!logs[1].record.request_id.is_empty());
        assert_ne!(logs[1].record.request_id, "req-abc");
        assert_eq!(logs[2].record.request_id, "req-def");
        assert_eq!(logs[2].record.request_name, "/orders?page=2");
    }

    #[tokio::test]
    async fn response_context_overlays_request_context() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::empty());
            response
                .extensions_mut()
                .insert(req.context().with(USER_ID_KEY, "u7").with(CLIENT_ID_KEY, "mobile"));
            Ok::<_, Infallible>(response)
        }));

        let mut request = get("/login");
        request.set_context(RequestContext::new().with(REQUEST_ID_KEY, "req-1"));
        drain(svc.oneshot(request).await.unwrap()).await;

        let record = single(&sink).record;
        assert_eq!(record.request_id, "req-1");
        assert_eq!(record.user_id, "u7");
        assert_eq!(record.client_id, "mobile");
    }

    #[tokio::test]
    async fn dropped_body_still_logs_once() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| {
            respond(StatusCode::OK, "never read")
        }));

        let response = svc.oneshot(get("/download")).await.unwrap();
        assert!(sink.is_empty());
        drop(response);

        let log = single(&sink);
        assert_eq!(log.record.additional_info["resp_bytes_length"], 0);
        assert_eq!(log.record.additional_info["resp_status"], 200);
    }

    #[tokio::test]
    async fn panic_is_logged_and_propagated() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| async {
            if true {
                panic!("handler exploded");
            }
            Ok::<Response<Body>, Infallible>(Response::new(Body::empty()))
        }));

        let outcome = tokio::spawn(svc.oneshot(get("/boom"))).await;
        assert!(outcome.unwrap_err().is_panic());

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Error);
        assert_eq!(log.message, "Internal Server Error");
        assert_eq!(log.record.additional_info["resp_status"], 500);
    }

    #[tokio::test]
    async fn service_error_is_logged_and_returned() {
        let sink = MemorySink::new();
        let svc = layer(&sink).layer(service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, &'static str>("upstream refused")
        }));

        let err = svc.oneshot(get("/upstream")).await.unwrap_err();
        assert_eq!(err, "upstream refused");

        let log = single(&sink);
        assert_eq!(log.severity, Severity::Error);
        assert_eq!(log.record.additional_info["resp_status"], 500);
    }

    #[test]
    fn build_record_keeps_template_info() {
        let template = LogRecord::template("orders-api", "http", "1.4.2").with_info("region", "eu-west-1");
        let meta = RequestMeta::from_request(&get("/health"));
        let mut observer = ResponseObserver::new(false);
        observer.set_status(StatusCode::NO_CONTENT);

        let record = build_record(
            &template,
            &meta,
            &RequestContext::new(),
            Utc::now(),
            Duration::from_millis(3),
            &observer,
        );

        assert_eq!(record.duration, 3_000_000);
        assert_eq!(record.additional_info["region"], "eu-west-1");
        assert_eq!(record.additional_info["resp_status"], 204);
        assert_eq!(record.additional_info["resp_elapsed_ms"], "3ms");
        assert!(template.additional_info.get("resp_status").is_none());
    }

    #[test]
    fn unknown_status_text() {
        let status = StatusCode::from_u16(599).unwrap();
        assert_eq!(status_text(status), "Unknown Status");
        assert_eq!(StatusError::from_status(StatusCode::BAD_GATEWAY).to_string(), "Bad Gateway");
    }
}
