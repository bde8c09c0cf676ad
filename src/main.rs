// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WellTrack ingestion API server
//!
//! Receives Garmin and Strava webhooks and exposes the batch trigger used by
//! the external scheduler.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use welltrack_ingest::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, InMemoryStore, Store},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        store_backend = ?config.store_backend,
        ack_policy = ?config.ack_policy,
        "Starting WellTrack ingestion API"
    );

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; queued events are lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(config.clone(), db));

    // Build router
    let app = welltrack_ingest::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("welltrack_ingest=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
