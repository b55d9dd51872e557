//! Request metadata extraction.
//!
//! # Responsibilities
//! - Snapshot the parts of a request the access record needs before the
//!   request is handed to the downstream service
//! - Resolve the scheme from the transport security signal
//! - Best-effort client address extraction
//!
//! # Design Decisions
//! - The snapshot is owned data so it can outlive the request itself
//! - A malformed peer address is logged raw rather than dropped

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, uri::Scheme, Method, Request};

/// Marker extension set by TLS acceptors on requests that arrived over TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTransport;

/// Raw peer address as reported by the transport, when it is not a `SocketAddr`.
#[derive(Debug, Clone)]
pub struct RemoteAddr(pub String);

/// Owned snapshot of request metadata.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub host: String,
    /// Request target as sent: path plus query, or the full URI for
    /// absolute-form requests.
    pub uri: String,
    pub path: String,
    pub path_and_query: String,
    pub proto: String,
    pub scheme: &'static str,
    pub remote_addr: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let uri = req.uri();
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            method: req.method().clone(),
            host,
            uri: uri.to_string(),
            path: uri.path().to_string(),
            path_and_query: uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string()),
            proto: format!("{:?}", req.version()),
            scheme: scheme_of(req),
            remote_addr: remote_ip(&raw_peer(req)),
            user_agent,
        }
    }

    /// Reconstructed address, e.g. `https://example.com/orders?id=1`.
    pub fn addr(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_and_query)
    }

    /// Method label for the record, e.g. `[GET] /health`.
    pub fn method_label(&self) -> String {
        format!("[{}] {}", self.method, self.path)
    }
}

fn scheme_of<B>(req: &Request<B>) -> &'static str {
    let secure = req.extensions().get::<SecureTransport>().is_some()
        || req.uri().scheme() == Some(&Scheme::HTTPS);
    if secure {
        "https"
    } else {
        "http"
    }
}

fn raw_peer<B>(req: &Request<B>) -> String {
    if let Some(RemoteAddr(raw)) = req.extensions().get::<RemoteAddr>() {
        return raw.clone();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default()
}

/// Host part of a `host:port` peer address; the raw string when it does not parse.
pub fn remote_ip(raw: &str) -> String {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() && !host.contains(':') => {
            host.to_string()
        }
        _ => raw.to_string(),
    }
}
