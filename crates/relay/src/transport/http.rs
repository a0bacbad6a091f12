// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::RelayError;
use crate::notification::Notification;
use crate::state::RelayState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
    pub enqueued: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        connections: s.registry.connections().await,
    })
}

/// `POST /api/v1/token` — issue a one-time handshake token.
///
/// The caller is authenticated by the bearer auth layer; the recipient
/// identity it acts for arrives in the `x-recipient-id` header, set by the
/// fronting system that owns session auth.
pub async fn issue_token(
    State(s): State<Arc<RelayState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(recipient_id) = headers.get("x-recipient-id").and_then(|v| v.to_str().ok()) else {
        return RelayError::BadRequest
            .to_http_response("missing x-recipient-id header")
            .into_response();
    };

    match s.tokens.issue(recipient_id).await {
        Ok(token) => Json(TokenResponse { token }).into_response(),
        Err(e) => {
            tracing::warn!(recipient_id, err = %e, "handshake token issue failed");
            RelayError::Internal.to_http_response("token store unavailable").into_response()
        }
    }
}

/// `POST /api/v1/notifications` — producer entry point.
///
/// Called by the notification-creation path after persisting a record. A
/// rejected enqueue is the one hard error of the system: surfacing it lets
/// the caller retry or alert instead of silently dropping the notification.
pub async fn create_notification(
    State(s): State<Arc<RelayState>>,
    Json(notification): Json<Notification>,
) -> impl IntoResponse {
    if notification.recipient_id.is_empty() {
        return RelayError::BadRequest.to_http_response("empty recipient_id").into_response();
    }

    match s.producer.push(&notification).await {
        Ok(enqueued) => {
            Json(EnqueueResponse { id: notification.id, enqueued }).into_response()
        }
        Err(e) => {
            tracing::error!(
                notification_id = %notification.id,
                recipient_id = %notification.recipient_id,
                err = %e,
                "notification enqueue failed"
            );
            RelayError::QueueUnavailable
                .to_http_response(format!("enqueue failed: {e}"))
                .into_response()
        }
    }
}
