//! HTTP surface: Bot API webhook, buyer message intake, and health check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::intake;
use crate::models::message::InboundBuyerMessage;
use crate::operator::render;
use crate::state::AppState;
use crate::{AppError, Result};

use super::events;
use super::updates::Update;

/// Header Telegram sets to the configured webhook secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Header the marketplace relay sets to the configured intake secret.
pub const INTAKE_SECRET_HEADER: &str = "x-reply-desk-intake-secret";

fn secret_matches(headers: &HeaderMap, name: &str, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers.get(name).and_then(|v| v.to_str().ok()) == Some(expected)
}

async fn health() -> &'static str {
    "ok"
}

async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    let expected = state.config.telegram.webhook_secret.as_deref();
    if !secret_matches(&headers, SECRET_HEADER, expected) {
        warn!(update_id = update.update_id, "webhook secret mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let span = info_span!("update", update_id = update.update_id);
    tokio::spawn(events::handle_update(state, update).instrument(span));
    StatusCode::OK
}

async fn receive_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(inbound): Json<InboundBuyerMessage>,
) -> impl IntoResponse {
    let expected = state.config.marketplace.intake_secret.as_deref();
    if !secret_matches(&headers, INTAKE_SECRET_HEADER, expected) {
        warn!(chat_id = %inbound.chat_id, "intake secret mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "unauthorized" })),
        );
    }

    match intake::ingest(&state, inbound).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message_id": record.message_id,
                "notification_chat_id": record.notification_chat_id,
            })),
        ),
        Err(err) => {
            let status = match err {
                AppError::Validation(_) => StatusCode::BAD_REQUEST,
                AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({ "success": false, "message": render::failure(&err) })),
            )
        }
    }
}

/// Routes served by [`serve`].
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/messages", post(receive_message))
        .with_state(state)
}

/// Serve the HTTP surface on `config.http_port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    info!(%bind, "starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP server shut down");
    Ok(())
}
