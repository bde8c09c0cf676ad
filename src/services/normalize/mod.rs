// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider normalizers: raw webhook payloads → canonical metrics.
//!
//! One [`Normalizer`] per [`EventSource`]. Adding a provider means adding a
//! source variant and a normalizer, not branching inside an existing one.

pub mod garmin;
pub mod strava;

pub use garmin::GarminNormalizer;
pub use strava::StravaNormalizer;

use crate::db::Store;
use crate::error::Result;
use crate::models::{EventSource, HealthMetric, MetricOwner, WebhookEvent};
use crate::services::strava::StravaClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Converts one queued event into zero or more metrics.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// `recorded_at` is stamped on every produced metric.
    async fn normalize(
        &self,
        event: &WebhookEvent,
        owner: &MetricOwner,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<HealthMetric>>;
}

/// The normalizer for each source.
pub struct Normalizers {
    garmin: GarminNormalizer,
    strava: StravaNormalizer,
}

impl Normalizers {
    pub fn new(store: Arc<dyn Store>, strava_client: StravaClient) -> Self {
        Self {
            garmin: GarminNormalizer,
            strava: StravaNormalizer::new(store, strava_client),
        }
    }

    pub fn for_source(&self, source: EventSource) -> &dyn Normalizer {
        match source {
            EventSource::Garmin => &self.garmin,
            EventSource::Strava => &self.strava,
        }
    }
}

/// Whether a provider event revokes our access to the user's data.
pub fn is_disconnect_event(event: &WebhookEvent) -> bool {
    match event.source {
        EventSource::Garmin => event.event_type == garmin::DEREGISTRATION,
        EventSource::Strava => strava::is_deauthorization(&event.event_type, &event.payload),
    }
}

/// Present and non-zero.
fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}
