// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook batch processing.
//!
//! Each invocation handles one bounded batch of due events:
//! 1. Resolve the event's internal identity
//! 2. Normalize the payload with the source's normalizer
//! 3. Upsert the resulting metrics by dedupe hash
//! 4. Apply disconnect side effects
//! 5. Complete the event, or record the failure with backoff
//!
//! Failures never leave the per-event boundary, panics included; only a
//! failure to select the batch itself is returned to the caller.

use crate::config::{Config, UnresolvedIdentityPolicy};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{EventStatus, MetricOwner, WebhookEvent};
use crate::services::identity::IdentityResolver;
use crate::services::normalize::{is_disconnect_event, Normalizers};
use crate::services::strava::StravaClient;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Aggregate outcome of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Events that reached `completed`
    pub processed: usize,
    /// Events re-armed for retry or dead-lettered
    pub failed: usize,
}

/// Drains due events from the queue into the metric store.
pub struct BatchProcessor {
    store: Arc<dyn Store>,
    identity: IdentityResolver,
    normalizers: Normalizers,
    retry_base: Duration,
    unresolved_identity_policy: UnresolvedIdentityPolicy,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn Store>, strava: StravaClient, config: &Config) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone()),
            normalizers: Normalizers::new(store.clone(), strava),
            store,
            retry_base: config.retry_base,
            unresolved_identity_policy: config.unresolved_identity_policy,
        }
    }

    /// Process up to `batch_size` due events.
    pub async fn process(&self, batch_size: usize) -> Result<BatchSummary> {
        self.process_at(batch_size, Utc::now()).await
    }

    /// Process up to `batch_size` events that are due at `now`.
    pub async fn process_at(&self, batch_size: usize, now: DateTime<Utc>) -> Result<BatchSummary> {
        let events = self.store.due_events(now, batch_size).await?;
        tracing::info!(count = events.len(), batch_size, "Processing webhook batch");

        let mut summary = BatchSummary::default();
        for mut event in events {
            if self.process_event(&mut event, now).await {
                summary.processed += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(
            processed = summary.processed,
            failed = summary.failed,
            "Webhook batch complete"
        );
        Ok(summary)
    }

    /// Run one event through the pipeline and persist its new state.
    ///
    /// Returns true when the event was completed.
    async fn process_event(&self, event: &mut WebhookEvent, now: DateTime<Utc>) -> bool {
        if event.status.is_terminal() {
            tracing::debug!(event_id = %event.id, status = ?event.status, "Skipping terminal event");
            return event.status == EventStatus::Completed;
        }

        let outcome = AssertUnwindSafe(self.handle(event, now))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AppError::Internal(anyhow::anyhow!(
                    "event handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let completed = match outcome {
            Ok(()) => {
                event.mark_completed(now);
                tracing::info!(
                    event_id = %event.id,
                    source = %event.source,
                    event_type = %event.event_type,
                    "Webhook event completed"
                );
                true
            }
            Err(e) => {
                let status = event.record_failure(&e.to_string(), now, self.retry_base);
                if status == EventStatus::DeadLetter {
                    tracing::error!(
                        event_id = %event.id,
                        source = %event.source,
                        event_type = %event.event_type,
                        attempts = event.attempts,
                        error = %e,
                        "Webhook event dead-lettered"
                    );
                } else {
                    tracing::warn!(
                        event_id = %event.id,
                        source = %event.source,
                        event_type = %event.event_type,
                        attempts = event.attempts,
                        next_retry_at = ?event.next_retry_at,
                        error = %e,
                        "Webhook event failed, will retry"
                    );
                }
                false
            }
        };

        // The event stays due if this write is lost, so the next run retries it
        if let Err(e) = self.store.update_event(event).await {
            tracing::error!(event_id = %event.id, error = %e, "Failed to persist event state");
            return false;
        }

        completed
    }

    async fn handle(&self, event: &mut WebhookEvent, now: DateTime<Utc>) -> Result<()> {
        let owner = self.resolve_owner(event).await?;

        if is_disconnect_event(event) {
            return self.disconnect(event, now).await;
        }

        let Some(owner) = owner else {
            return match self.unresolved_identity_policy {
                UnresolvedIdentityPolicy::Complete => {
                    tracing::warn!(
                        event_id = %event.id,
                        source = %event.source,
                        external_user_id = ?event.external_user_id(),
                        "Unresolved identity, completing without metrics"
                    );
                    Ok(())
                }
                UnresolvedIdentityPolicy::Retry => Err(AppError::NotFound(format!(
                    "no {} connection for {}",
                    event.source,
                    event.external_user_id().unwrap_or("<missing>")
                ))),
            };
        };

        let metrics = self
            .normalizers
            .for_source(event.source)
            .normalize(event, &owner, now)
            .await?;

        self.store.upsert_metrics(&metrics).await?;

        tracing::debug!(
            event_id = %event.id,
            metrics = metrics.len(),
            "Upserted normalized metrics"
        );
        Ok(())
    }

    /// Fill in `user_id` / `profile_id` on the event where possible.
    async fn resolve_owner(&self, event: &mut WebhookEvent) -> Result<Option<MetricOwner>> {
        if event.user_id.is_none() {
            if let Some(external_id) = event.external_user_id().map(str::to_string) {
                if let Some(identity) = self.identity.resolve(event.source, &external_id).await? {
                    event.user_id = Some(identity.user_id);
                    if event.profile_id.is_none() {
                        event.profile_id = identity.profile_id;
                    }
                }
            }
        }

        let Some(user_id) = event.user_id.clone() else {
            return Ok(None);
        };

        if event.profile_id.is_none() {
            event.profile_id = self.identity.primary_profile_id(&user_id).await?;
        }

        Ok(event.profile_id.clone().map(|profile_id| MetricOwner {
            user_id,
            profile_id,
        }))
    }

    async fn disconnect(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Result<()> {
        let Some(external_id) = event.external_user_id() else {
            tracing::warn!(event_id = %event.id, "Disconnect event without provider user ID");
            return Ok(());
        };

        let touched = self
            .store
            .mark_disconnected(event.source, external_id, now)
            .await?;

        tracing::info!(
            event_id = %event.id,
            source = %event.source,
            external_user_id = external_id,
            touched,
            "Provider connection marked disconnected"
        );
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
