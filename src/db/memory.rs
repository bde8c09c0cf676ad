// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store for tests and local development.
//!
//! Not durable and not shared across processes.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{EventSource, HealthMetric, Profile, ProviderConnection, WebhookEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local [`Store`] backed by concurrent maps.
#[derive(Default)]
pub struct InMemoryStore {
    events: DashMap<String, WebhookEvent>,
    metrics: DashMap<String, HealthMetric>,
    connections: DashMap<String, ProviderConnection>,
    profiles: DashMap<String, Profile>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Seeding / inspection helpers ────────────────────────────

    pub fn add_connection(&self, connection: ProviderConnection) {
        let id = ProviderConnection::document_id(connection.provider, &connection.external_user_id);
        self.connections.insert(id, connection);
    }

    pub fn add_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn connection(
        &self,
        provider: EventSource,
        external_user_id: &str,
    ) -> Option<ProviderConnection> {
        self.connections
            .get(&ProviderConnection::document_id(provider, external_user_id))
            .map(|c| c.value().clone())
    }

    /// All events, oldest first.
    pub fn events(&self) -> Vec<WebhookEvent> {
        let mut events: Vec<WebhookEvent> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        events
    }

    /// All metrics, ordered by type then start time.
    pub fn metrics(&self) -> Vec<HealthMetric> {
        let mut metrics: Vec<HealthMetric> = self.metrics.iter().map(|m| m.value().clone()).collect();
        metrics.sort_by(|a, b| {
            a.metric_type
                .cmp(&b.metric_type)
                .then(a.start_time.cmp(&b.start_time))
        });
        metrics
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_event(&self, event: &WebhookEvent) -> Result<(), AppError> {
        match self.events.entry(event.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Database(format!(
                "Event {} already exists",
                event.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                Ok(())
            }
        }
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, AppError> {
        Ok(self.events.get(event_id).map(|e| e.value().clone()))
    }

    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, AppError> {
        let mut due: Vec<WebhookEvent> = self
            .events
            .iter()
            .filter(|e| e.is_due(now))
            .map(|e| e.value().clone())
            .collect();
        due.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        due.truncate(limit);
        Ok(due)
    }

    async fn update_event(&self, event: &WebhookEvent) -> Result<(), AppError> {
        self.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn upsert_metric(&self, metric: &HealthMetric) -> Result<(), AppError> {
        self.metrics
            .insert(metric.dedupe_hash.clone(), metric.clone());
        Ok(())
    }

    async fn find_connection(
        &self,
        provider: EventSource,
        external_user_id: &str,
    ) -> Result<Option<ProviderConnection>, AppError> {
        Ok(self.connection(provider, external_user_id))
    }

    async fn primary_profile_id(&self, user_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| p.user_id == user_id && p.is_primary)
            .map(|p| p.id.clone())
            .min())
    }

    async fn mark_disconnected(
        &self,
        provider: EventSource,
        external_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let id = ProviderConnection::document_id(provider, external_user_id);
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.is_connected = false;
                conn.disconnected_at = Some(at);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
