// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared ingestion plumbing for provider webhook endpoints.
//!
//! Providers disable subscriptions whose deliveries keep failing, so the
//! endpoints only parse, attach a best-effort identity and queue. How a
//! queueing failure is reported is decided by [`AckPolicy`].

use crate::config::AckPolicy;
use crate::error::AppError;
use crate::models::WebhookEvent;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Body of every acknowledged delivery.
#[derive(Serialize)]
pub struct ReceivedResponse {
    pub status: &'static str,
}

/// `200 {"status":"received"}`
pub fn acknowledge() -> Response {
    (StatusCode::OK, Json(ReceivedResponse { status: "received" })).into_response()
}

/// Bare `OPTIONS` on a webhook route (CORS preflights are answered by the
/// CORS layer before reaching this).
pub async fn preflight() -> &'static str {
    "ok"
}

/// Parse a delivery body as JSON.
///
/// A body that cannot be read (for instance one over the configured size
/// limit) or parsed is acknowledged under [`AckPolicy::AlwaysAcknowledge`]
/// (redelivery would not fix it). Under [`AckPolicy::Strict`] an unreadable
/// body keeps its rejection status and unparseable JSON gets 400.
pub fn parse_body(
    state: &AppState,
    source: &str,
    body: Result<Bytes, BytesRejection>,
) -> Result<Value, Response> {
    let body = body.map_err(|rejection| {
        tracing::error!(
            source,
            status = %rejection.status(),
            error = %rejection.body_text(),
            "Failed to read webhook body"
        );
        match state.config.ack_policy {
            AckPolicy::AlwaysAcknowledge => acknowledge(),
            AckPolicy::Strict => rejection.into_response(),
        }
    })?;

    serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(source, error = %e, len = body.len(), "Failed to parse webhook body");
        match state.config.ack_policy {
            AckPolicy::AlwaysAcknowledge => acknowledge(),
            AckPolicy::Strict => AppError::BadRequest(format!("invalid JSON: {}", e)).into_response(),
        }
    })
}

/// Attach a best-effort identity to the event and insert it into the queue.
pub async fn resolve_and_queue(state: &AppState, mut event: WebhookEvent) -> Response {
    if let Some(external_id) = event.external_user_id().map(str::to_string) {
        match state.identity.resolve(event.source, &external_id).await {
            Ok(Some(identity)) => {
                event.user_id = Some(identity.user_id);
                event.profile_id = identity.profile_id;
            }
            Ok(None) => {}
            Err(e) => {
                // Resolved again at processing time
                tracing::warn!(
                    source = %event.source,
                    external_user_id = %external_id,
                    error = %e,
                    "Identity lookup failed during ingestion"
                );
            }
        }
    }

    match state.db.insert_event(&event).await {
        Ok(()) => {
            tracing::info!(
                event_id = %event.id,
                source = %event.source,
                event_type = %event.event_type,
                user_id = ?event.user_id,
                "Webhook event queued"
            );
            acknowledge()
        }
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                source = %event.source,
                event_type = %event.event_type,
                error = %e,
                "Failed to queue webhook event"
            );
            match state.config.ack_policy {
                AckPolicy::AlwaysAcknowledge => acknowledge(),
                AckPolicy::Strict => e.into_response(),
            }
        }
    }
}
