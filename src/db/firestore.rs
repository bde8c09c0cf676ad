// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Webhook events (the durable processing queue)
//! - Health metrics (keyed by dedupe hash, so writes are upserts)
//! - Health connections (provider account → profile links)
//! - Profiles (primary profile lookup)

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::{EventSource, HealthMetric, Profile, ProviderConnection, WebhookEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Seeding (account side / tests) ──────────────────────────

    /// Create or replace a provider connection.
    pub async fn upsert_connection(&self, connection: &ProviderConnection) -> Result<(), AppError> {
        let doc_id =
            ProviderConnection::document_id(connection.provider, &connection.external_user_id);
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::HEALTH_CONNECTIONS)
            .document_id(&doc_id)
            .object(connection)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create or replace a profile.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&profile.id)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get a metric by its dedupe hash.
    pub async fn get_metric(&self, dedupe_hash: &str) -> Result<Option<HealthMetric>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::HEALTH_METRICS)
            .obj()
            .one(dedupe_hash)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── Event Queue ─────────────────────────────────────────────

    async fn insert_event(&self, event: &WebhookEvent) -> Result<(), AppError> {
        let _: WebhookEvent = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::WEBHOOK_EVENTS)
            .document_id(&event.id)
            .object(event)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::WEBHOOK_EVENTS)
            .obj()
            .one(event_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn due_events(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookEvent>, AppError> {
        let now = firestore::FirestoreTimestamp(now);
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::WEBHOOK_EVENTS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq("pending"),
                    q.for_any([
                        q.field("next_retry_at").is_null(),
                        q.field("next_retry_at").less_than_or_equal(now.clone()),
                    ]),
                ])
            })
            // Composite index: status ASC, received_at ASC, next_retry_at ASC
            .order_by([(
                "received_at",
                firestore::FirestoreQueryDirection::Ascending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_event(&self, event: &WebhookEvent) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::WEBHOOK_EVENTS)
            .document_id(&event.id)
            .object(event)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Metrics ─────────────────────────────────────────────────

    async fn upsert_metric(&self, metric: &HealthMetric) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::HEALTH_METRICS)
            .document_id(&metric.dedupe_hash)
            .object(metric)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    async fn upsert_metrics(&self, metrics: &[HealthMetric]) -> Result<(), AppError> {
        let writes: Vec<_> = metrics
            .iter()
            .map(|metric| self.upsert_metric(metric))
            .collect();
        stream::iter(writes)
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;
        Ok(())
    }

    // ─── Connections / Profiles ──────────────────────────────────

    async fn find_connection(
        &self,
        provider: EventSource,
        external_user_id: &str,
    ) -> Result<Option<ProviderConnection>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::HEALTH_CONNECTIONS)
            .obj()
            .one(&ProviderConnection::document_id(provider, external_user_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn primary_profile_id(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let user_id = user_id.to_string();
        let profiles: Vec<Profile> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROFILES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("is_primary").eq(true),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(profiles.into_iter().next().map(|p| p.id))
    }

    async fn mark_disconnected(
        &self,
        provider: EventSource,
        external_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let Some(mut connection) = self.find_connection(provider, external_user_id).await? else {
            return Ok(0);
        };

        connection.is_connected = false;
        connection.disconnected_at = Some(at);

        // Only touch the two flags so a concurrent token refresh is not clobbered.
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(firestore::paths!(ProviderConnection::{is_connected, disconnected_at}))
            .in_col(collections::HEALTH_CONNECTIONS)
            .document_id(ProviderConnection::document_id(provider, external_user_id))
            .object(&connection)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(1)
    }
}
