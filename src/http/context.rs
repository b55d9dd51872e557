//! Request-scoped key/value context.
//!
//! # Responsibilities
//! - Carry request identity (request id/name, user, session, client) through
//!   the handler chain
//! - Give every layer its own view: writes never mutate a view another layer holds
//!
//! # Design Decisions
//! - Persistent overlay chain: `with` links a new entry in front of the old
//!   chain, so clones are a pointer copy
//! - Lives in `http::Request` extensions, not in any process-wide state

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;

/// Key for the request identifier.
pub const REQUEST_ID_KEY: &str = "request_id";
/// Key for the human-readable request name.
pub const REQUEST_NAME_KEY: &str = "request_name";
/// Key for the authenticated user.
pub const USER_ID_KEY: &str = "user_id";
/// Key for the session.
pub const SESSION_ID_KEY: &str = "session_id";
/// Key for the calling client application.
pub const CLIENT_ID_KEY: &str = "client_id";

struct Entry {
    key: String,
    value: String,
    parent: Option<Arc<Entry>>,
}

/// Immutable-per-write association scoped to one request.
#[derive(Clone, Default)]
pub struct RequestContext {
    head: Option<Arc<Entry>>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new view with `key` set to `value`. `self` is unchanged.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key: key.into(),
                value: value.into(),
                parent: self.head.clone(),
            })),
        }
    }

    /// Latest value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// True when `key` holds a non-empty value.
    pub fn has_value(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_KEY)
    }

    pub fn request_name(&self) -> Option<&str> {
        self.get(REQUEST_NAME_KEY)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(USER_ID_KEY)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(SESSION_ID_KEY)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get(CLIENT_ID_KEY)
    }

    /// Apply every entry of `other` on top of `self`, oldest first.
    pub fn overlay(&self, other: &RequestContext) -> Self {
        let mut pending: Vec<&Entry> = other.entries().collect();
        pending.reverse();
        pending
            .into_iter()
            .fold(self.clone(), |ctx, entry| ctx.with(entry.key.clone(), entry.value.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Newest-first walk of the chain, shadowed keys included.
    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |&entry| entry.parent.as_deref())
    }

    /// Effective key/value pairs after shadowing.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for entry in self.entries() {
            map.entry(entry.key.clone())
                .or_insert_with(|| entry.value.clone());
        }
        map
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.to_map()).finish()
    }
}

/// Access to the [`RequestContext`] stored in request extensions.
pub trait RequestContextExt {
    /// Current context, or an empty one when none was attached.
    fn context(&self) -> RequestContext;

    /// Replace the context carried by the request.
    fn set_context(&mut self, ctx: RequestContext);

    /// Set a single key, keeping everything already in the context.
    fn with_context_value(&mut self, key: &str, value: impl Into<String>) {
        let ctx = self.context().with(key, value);
        self.set_context(ctx);
    }
}

impl<B> RequestContextExt for Request<B> {
    fn context(&self) -> RequestContext {
        self.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default()
    }

    fn set_context(&mut self, ctx: RequestContext) {
        self.extensions_mut().insert(ctx);
    }
}

/// Handlers can take the context as an argument; empty when none was attached.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
