//! Response observation.
//!
//! # Responsibilities
//! - Record the status, byte count and (optionally) body of a response
//! - Forward every body frame to the transport untouched
//! - Tell the owner exactly once when the response is finished
//!
//! # Data Flow
//! ```text
//! handler body ──frame──▶ ObservedBody ──same frame──▶ hyper ──▶ client
//!                             │
//!                             └─▶ ResponseObserver (status, bytes, body?)
//!                                      │ end of stream / drop
//!                                      ▼
//!                                 completion hook
//! ```
//!
//! # Design Decisions
//! - Frames are yielded the moment the inner body yields them, so streaming
//!   and chunked responses keep their flush cadence
//! - Body capture is off by default; large or endless streams cost nothing
//! - Trailers, errors, `is_end_stream` and `size_hint` pass straight through

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Observation state for a single response.
#[derive(Debug, Clone)]
pub struct ResponseObserver {
    status: Option<StatusCode>,
    bytes_written: u64,
    body: Option<BytesMut>,
}

impl ResponseObserver {
    /// Create an observer. `capture_body` enables body buffering.
    pub fn new(capture_body: bool) -> Self {
        Self {
            status: None,
            bytes_written: 0,
            body: capture_body.then(BytesMut::new),
        }
    }

    /// Record the response status.
    ///
    /// The first status set before any body bytes is authoritative. Once bytes
    /// have gone out the head is on the wire, so later calls are ignored.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.status.is_none() && self.bytes_written == 0 {
            self.status = Some(status);
        }
    }

    /// Account for bytes that were successfully handed to the transport.
    pub fn record_write(&mut self, bytes: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.bytes_written += bytes.len() as u64;
        if let Some(body) = self.body.as_mut() {
            body.extend_from_slice(bytes);
        }
    }

    /// Status the transport uses; 200 when none was set explicitly.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Captured body; always empty when capture is disabled.
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn is_capturing(&self) -> bool {
        self.body.is_some()
    }
}

type CompletionHook = Box<dyn FnOnce(&ResponseObserver) + Send>;

/// Response body decorator feeding a [`ResponseObserver`].
pub struct ObservedBody<B> {
    inner: B,
    observer: ResponseObserver,
    on_complete: Option<CompletionHook>,
}

impl<B> ObservedBody<B> {
    pub fn new(inner: B, observer: ResponseObserver) -> Self {
        Self {
            inner,
            observer,
            on_complete: None,
        }
    }

    /// Run `hook` once, when the body ends or is dropped, whichever is first.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&ResponseObserver) + Send + 'static,
    {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn observer(&self) -> &ResponseObserver {
        &self.observer
    }

    fn complete(&mut self) {
        if let Some(hook) = self.on_complete.take() {
            hook(&self.observer);
        }
    }
}

impl<B> HttpBody for ObservedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.observer.record_write(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for ObservedBody<B> {
    fn drop(&mut self) {
        self.complete();
    }
}

impl<B> fmt::Debug for ObservedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedBody")
            .field("observer", &self.observer)
            .field("completed", &self.on_complete.is_none())
            .finish_non_exhaustive()
    }
}
