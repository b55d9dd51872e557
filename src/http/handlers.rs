//! Handlers for the bundled service.
//!
//! # Responsibilities
//! - `/health`: liveness probe, empty 200
//! - `POST /orders`: accept an order, 201 with a JSON receipt
//! - `/events`: chunked response streamed in several frames
//! - `/ws`: WebSocket echo (exercises protocol upgrade through the layers)

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http::context::RequestContext;

/// Routes served by the bundled binary.
pub fn routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(create_order))
        .route("/events", get(events))
        .route("/ws", any(echo))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct NewOrder {
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub id: String,
    pub sku: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

async fn create_order(ctx: RequestContext, Json(order): Json<NewOrder>) -> Response {
    if order.quantity == 0 {
        return (StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive").into_response();
    }

    let receipt = OrderReceipt {
        id: format!("ord_{}", Uuid::new_v4().simple()),
        sku: order.sku,
        quantity: order.quantity,
        request_id: ctx.request_id().map(str::to_string),
    };
    tracing::debug!(order_id = %receipt.id, "Order accepted");
    (StatusCode::CREATED, Json(receipt)).into_response()
}

/// Chunks sent by `/events`, one body frame each.
pub const EVENT_CHUNKS: [&str; 3] = ["event: tick\n\n", "event: tock\n\n", "event: done\n\n"];

async fn events() -> Response {
    let frames = stream::iter(EVENT_CHUNKS.map(|chunk| Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))));
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn echo(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(echo_socket)
}

async fn echo_socket(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                if socket.send(msg).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
