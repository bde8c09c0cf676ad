// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Batch trigger for the external scheduler.
//!
//! Cloud Scheduler (or any cron caller) hits this endpoint periodically; each
//! call drains one bounded batch. Overlapping calls are safe.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Task routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/tasks/process-webhooks",
        post(process_webhooks)
            .get(process_webhooks)
            .options(super::webhook::preflight),
    )
}

#[derive(Deserialize)]
struct ProcessParams {
    batch_size: Option<usize>,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Process one batch of due webhook events.
async fn process_webhooks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProcessParams>,
) -> Result<Json<ProcessResponse>, AppError> {
    let batch_size = state.config.clamp_batch_size(params.batch_size);
    let started = Instant::now();

    let summary = state.processor.process(batch_size).await.map_err(|e| {
        tracing::error!(error = %e, batch_size, "Failed to select due webhook events");
        e
    })?;

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        batch_size,
        processed = summary.processed,
        failed = summary.failed,
        duration_ms,
        "Webhook processing run finished"
    );

    Ok(Json(ProcessResponse {
        success: true,
        processed: summary.processed,
        failed: summary.failed,
        duration_ms,
    }))
}
