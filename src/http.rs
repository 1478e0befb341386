//! HTTP admin surface for an assembled messenger.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /health`: `{ "ok": true, "buses": [...], "failure_transport": ... }`.
//! - `GET /messenger`: `Messenger::describe()`.
//! - `GET /failed?limit=N`: failed messages, oldest first.
//! - `GET /failed/:id`: one failed message.
//! - `POST /failed/:id/retry`: send it back to its original receiver.
//! - `DELETE /failed/:id`: discard it.
//!
//! Without a failure transport the `/failed` routes answer 501.
//!
//! ## Example
//!
//! ```ignore
//! let messenger = Arc::new(Messenger::builder(config).assemble()?);
//!
//! // Compose with other axum routes
//! let app = messenger_bundle::http::router(messenger.clone());
//!
//! // Or serve directly
//! messenger_bundle::http::serve(messenger, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::failure::FailureError;
use crate::messenger::Messenger;

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

/// Build an axum `Router` exposing the messenger's admin operations.
pub fn router(messenger: Arc<Messenger>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/messenger", get(describe_handler))
        .route("/failed", get(list_handler))
        .route("/failed/:id", get(show_handler).delete(remove_handler))
        .route("/failed/:id/retry", post(retry_handler))
        .with_state(messenger)
}

/// Serve the admin routes at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(messenger: Arc<Messenger>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(messenger);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler(State(messenger): State<Arc<Messenger>>) -> impl IntoResponse {
    let buses = messenger.buses().names();
    Json(json!({
        "ok": true,
        "buses": buses,
        "failure_transport": messenger.failed_messages().transport_name(),
    }))
}

async fn describe_handler(State(messenger): State<Arc<Messenger>>) -> impl IntoResponse {
    Json(messenger.describe())
}

async fn list_handler(
    State(messenger): State<Arc<Messenger>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    match messenger.failed_messages().list(params.limit) {
        Ok(envelopes) => {
            let body: Vec<Value> = envelopes.iter().map(envelope_json).collect();
            (StatusCode::OK, Json(Value::Array(body))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn show_handler(
    State(messenger): State<Arc<Messenger>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match messenger.failed_messages().show(&id) {
        Ok(envelope) => (StatusCode::OK, Json(envelope_json(&envelope))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn retry_handler(
    State(messenger): State<Arc<Messenger>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match messenger.failed_messages().retry(&id) {
        Ok(envelope) => (StatusCode::OK, Json(envelope_json(&envelope))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn remove_handler(
    State(messenger): State<Arc<Messenger>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match messenger.failed_messages().remove(&id) {
        Ok(envelope) => (StatusCode::OK, Json(envelope_json(&envelope))).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: FailureError) -> axum::response::Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// Admin view of an envelope. UTF-8 bodies are shown as text, others base64.
fn envelope_json(envelope: &Envelope) -> Value {
    let body = match envelope.body_str() {
        Some(text) => json!({ "text": text }),
        None => json!({ "base64": STANDARD.encode(&envelope.body) }),
    };
    json!({
        "id": envelope.transport_message_id(),
        "message_id": envelope.id,
        "message_type": envelope.message_type,
        "original_receiver": envelope.original_receiver(),
        "error": envelope.error_details(),
        "retry_count": envelope.retry_count(),
        "body": body,
    })
}
