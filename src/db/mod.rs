// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! [`Store`] is the persistence seam used by the ingestion endpoints and the
//! batch processor. [`FirestoreDb`] backs production; [`InMemoryStore`] backs
//! tests and single-process development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::InMemoryStore;

use crate::error::AppError;
use crate::models::{EventSource, HealthMetric, ProviderConnection, WebhookEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const WEBHOOK_EVENTS: &str = "webhook_events";
    pub const HEALTH_METRICS: &str = "health_metrics";
    pub const HEALTH_CONNECTIONS: &str = "health_connections";
    pub const PROFILES: &str = "profiles";
}

/// Keyed persistence for events, metrics and provider connections.
///
/// Every mutation is either an insert of a fresh key, a last-write-wins
/// replace, or an idempotent upsert, so overlapping processor runs need no
/// locking.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Event Queue ─────────────────────────────────────────────

    /// Insert a newly received event.
    async fn insert_event(&self, event: &WebhookEvent) -> Result<(), AppError>;

    /// Get an event by ID.
    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, AppError>;

    /// Events that are `pending` and whose retry time (if any) has passed,
    /// oldest `received_at` first, at most `limit`.
    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, AppError>;

    /// Replace an event's stored state.
    async fn update_event(&self, event: &WebhookEvent) -> Result<(), AppError>;

    // ─── Metrics ─────────────────────────────────────────────────

    /// Insert or replace a metric keyed by its dedupe hash.
    async fn upsert_metric(&self, metric: &HealthMetric) -> Result<(), AppError>;

    /// Upsert several metrics; stops at the first failure.
    async fn upsert_metrics(&self, metrics: &[HealthMetric]) -> Result<(), AppError> {
        for metric in metrics {
            self.upsert_metric(metric).await?;
        }
        Ok(())
    }

    // ─── Connections / Profiles ──────────────────────────────────

    /// Look up the connection for a provider-native user ID.
    async fn find_connection(
        &self,
        provider: EventSource,
        external_user_id: &str,
    ) -> Result<Option<ProviderConnection>, AppError>;

    /// ID of the user's primary profile, if any.
    async fn primary_profile_id(&self, user_id: &str) -> Result<Option<String>, AppError>;

    /// Clear `is_connected` and stamp `disconnected_at` on the matching
    /// connection. Returns how many connections were touched.
    async fn mark_disconnected(
        &self,
        provider: EventSource,
        external_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, AppError>;
}
