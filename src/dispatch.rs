//! Inbound request dispatcher.
//!
//! Every request lands in [`dispatch`], which classifies it and routes it:
//!
//! - `POST <any path>` with a JSON body: Telegram update, always answered 200
//! - `GET /`: health text
//! - `GET /webhook`: `getWebhookInfo` passthrough
//! - `GET /stats`: user count from the key-value store
//! - anything else: 404
//!
//! Update handling runs in its own task and returns a `Result`; an `Err` or a
//! panic in that task becomes the 200 webhook reply from [`fallback_response`].

use std::collections::HashMap;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::bot::{self, AppState};
use crate::error::RelayError;
use crate::platform::Update;

/// Sent to the user whenever update handling fails.
pub const FALLBACK_TEXT: &str =
    "Service experiencing temporary constraints. I'll reassess conditions shortly.";

pub const HEALTH_TEXT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " is running (v",
    env!("CARGO_PKG_VERSION"),
    ")"
);

// Telegram caps webhook payloads well below this.
const MAX_UPDATE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Update,
    Health,
    WebhookInfo,
    Stats,
    NotFound,
}

/// Webhook-reply body: Telegram performs the `sendMessage` itself.
#[derive(Debug, Serialize)]
struct FallbackReply {
    method: &'static str,
    chat_id: Option<String>,
    text: &'static str,
    parse_mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    status: &'static str,
    timestamp: String,
    user_count: u64,
    environment: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// First match wins.
pub fn classify(method: &Method, path: &str, headers: &HeaderMap) -> Route {
    if method == Method::POST && is_json(headers) {
        return Route::Update;
    }
    if method == Method::GET {
        match path {
            "/" => return Route::Health,
            "/webhook" => return Route::WebhookInfo,
            "/stats" => return Route::Stats,
            _ => {}
        }
    }
    Route::NotFound
}

pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    info!("{} {}", parts.method, parts.uri.path());

    let response = match classify(&parts.method, parts.uri.path(), &parts.headers) {
        Route::Update => match tokio::spawn(handle_update(state, body)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    "Update handling failed ({} {}, {}): {}",
                    parts.method,
                    parts.uri.path(),
                    e.kind(),
                    e
                );
                fallback_response(&parts.uri)
            }
            Err(e) => {
                error!(
                    "Update handler aborted ({} {}): {}",
                    parts.method,
                    parts.uri.path(),
                    e
                );
                fallback_response(&parts.uri)
            }
        },
        Route::Health => (StatusCode::OK, HEALTH_TEXT).into_response(),
        Route::WebhookInfo => webhook_info(&state).await.unwrap_or_else(admin_error),
        Route::Stats => stats(&state).await.unwrap_or_else(admin_error),
        Route::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    };

    info!(
        "Request completed in {}ms ({})",
        started.elapsed().as_millis(),
        response.status()
    );
    response
}

async fn read_body(body: Body) -> Result<Bytes, RelayError> {
    axum::body::to_bytes(body, MAX_UPDATE_BYTES)
        .await
        .map_err(|e| RelayError::Parse(format!("failed to read body: {e}")))
}

async fn handle_update(state: AppState, body: Body) -> Result<Response, RelayError> {
    let bytes = read_body(body).await?;
    match Update::parse(&bytes)? {
        Update::TextMessage(msg) => bot::handle_message(&state, &msg).await?,
        Update::Other => info!("Ignoring update without message text"),
    }
    Ok((StatusCode::OK, "OK").into_response())
}

/// Chat id from the `chat_id` query parameter; the body is never consulted.
fn fallback_chat_id(uri: &Uri) -> Option<String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(params)| params.get("chat_id").cloned())
        .filter(|id| !id.is_empty())
}

/// The fixed reply for a failed update. Always 200 so Telegram does not retry.
pub fn fallback_response(uri: &Uri) -> Response {
    let reply = FallbackReply {
        method: "sendMessage",
        chat_id: fallback_chat_id(uri),
        text: FALLBACK_TEXT,
        parse_mode: "Markdown",
    };
    (StatusCode::OK, Json(reply)).into_response()
}

fn admin_error(err: RelayError) -> Response {
    error!("Admin request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

async fn webhook_info(state: &AppState) -> Result<Response, RelayError> {
    let info = state.telegram.get_webhook_info().await?;
    Ok((StatusCode::OK, Json(info)).into_response())
}

async fn stats(state: &AppState) -> Result<Response, RelayError> {
    let user_count = match &state.store {
        Some(store) => store.count().await?,
        None => 0,
    };
    let body = StatsResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        user_count,
        environment: state.settings.environment.clone(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
