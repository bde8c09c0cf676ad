// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava push subscription endpoint.

use super::webhook::{parse_body, preflight, resolve_and_queue};
use crate::models::{EventSource, WebhookEvent};
use crate::services::normalize::strava::StravaEvent;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Strava webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/webhooks/strava",
        get(verify).post(handle_event).options(preflight),
    )
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let token_matches =
        params.verify_token.as_deref() == Some(state.config.strava_verify_token.as_str());

    match (params.mode.as_deref(), params.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            tracing::info!("Strava webhook subscription verified");
            (StatusCode::OK, Json(VerifyResponse { challenge })).into_response()
        }
        _ => {
            tracing::warn!(
                mode = ?params.mode,
                "Strava webhook verification failed: invalid token"
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Queue an incoming event (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let payload = match parse_body(&state, EventSource::Strava.as_str(), body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let parsed = StravaEvent::from_payload(&payload);
    if !parsed.is_recognized() {
        // Queued anyway; the raw payload is kept for inspection
        tracing::warn!(payload = %payload, "Unrecognized Strava event shape");
    }

    if let Some(expected) = state.config.strava_subscription_id {
        if parsed.subscription_id != Some(expected) {
            tracing::warn!(
                received_id = ?parsed.subscription_id,
                expected_id = expected,
                "Security Alert: Strava subscription ID mismatch"
            );
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let event_type = parsed.event_type();
    tracing::info!(
        event_type = %event_type,
        object_id = ?parsed.object_id,
        owner_id = ?parsed.owner_id,
        "Strava event received"
    );

    let mut event = WebhookEvent::new(
        EventSource::Strava,
        event_type,
        payload,
        state.config.max_attempts,
        Utc::now(),
    );
    event.strava_athlete_id = parsed.athlete_id();
    event.strava_object_id = parsed.object_id();

    resolve_and_queue(&state, event).await
}
