// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Health push endpoint.
//!
//! Garmin posts each summary type to its own URL, so the event type comes
//! from the path.

use super::webhook::{parse_body, preflight, resolve_and_queue};
use crate::models::{EventSource, WebhookEvent};
use crate::services::normalize::garmin;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    response::Response,
    routing::post,
    Router,
};
use chrono::Utc;
use std::sync::Arc;

/// Garmin webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/webhooks/garmin/{event_type}",
        post(handle_push).options(preflight),
    )
}

/// Queue a Garmin push (POST).
async fn handle_push(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let payload = match parse_body(&state, EventSource::Garmin.as_str(), body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let garmin_user_id = garmin::user_id(&event_type, &payload);
    if garmin_user_id.is_none() {
        tracing::warn!(event_type = %event_type, "Garmin push without userId");
    }

    let mut event = WebhookEvent::new(
        EventSource::Garmin,
        event_type,
        payload,
        state.config.max_attempts,
        Utc::now(),
    );
    event.garmin_user_id = garmin_user_id;

    resolve_and_queue(&state, event).await
}
