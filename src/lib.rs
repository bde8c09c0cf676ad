// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! WellTrack ingestion: fitness provider webhooks into canonical metrics
//!
//! Garmin and Strava push notifications are acknowledged immediately and
//! queued; a periodically triggered batch processor normalizes queued events
//! into deduplicated health metrics.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{BatchProcessor, IdentityResolver, StravaClient};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub identity: IdentityResolver,
    pub processor: BatchProcessor,
}

impl AppState {
    /// Wire up services over the given store.
    pub fn new(config: Config, db: Arc<dyn Store>) -> Self {
        let strava = StravaClient::new(config.strava_api_url.clone(), config.strava_fetch_timeout);
        Self {
            identity: IdentityResolver::new(db.clone()),
            processor: BatchProcessor::new(db.clone(), strava, &config),
            config,
            db,
        }
    }
}
