// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava webhook events.
//!
//! Strava events only reference an object, so activity create/update events
//! fetch the activity detail with the athlete's stored access token.

use super::{non_zero, Normalizer};
use crate::db::Store;
use crate::error::Result;
use crate::models::{EventSource, HealthMetric, MetricOwner, WebhookEvent};
use crate::services::strava::{ActivityFetch, StravaClient};
use crate::time_utils::parse_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const ACTIVITY_CREATE: &str = "activity_create";
pub const ACTIVITY_UPDATE: &str = "activity_update";
pub const ACTIVITY_DELETE: &str = "activity_delete";
pub const ATHLETE_UPDATE: &str = "athlete_update";
pub const ATHLETE_DEAUTHORIZATION: &str = "athlete_deauthorization";

const SOURCE: EventSource = EventSource::Strava;

/// Stand-in for an envelope field that is missing or not a string.
pub const UNKNOWN: &str = "unknown";

/// Strava webhook event envelope.
///
/// Read field by field so that any JSON object still yields an event to
/// queue; fields of the wrong type are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StravaEvent {
    pub object_type: Option<String>,
    pub aspect_type: Option<String>,
    pub object_id: Option<String>,
    pub owner_id: Option<String>,
    pub subscription_id: Option<u64>,
    pub updates: Value,
}

impl StravaEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let subscription_id = match payload.get("subscription_id") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            object_type: text("object_type"),
            aspect_type: text("aspect_type"),
            object_id: id_string(payload.get("object_id")),
            owner_id: id_string(payload.get("owner_id")),
            subscription_id,
            updates: payload.get("updates").cloned().unwrap_or_default(),
        }
    }

    /// Whether both halves of the event type were present.
    pub fn is_recognized(&self) -> bool {
        self.object_type.is_some() && self.aspect_type.is_some()
    }

    /// Queue event type: `{object_type}_{aspect_type}` with `unknown` for a
    /// missing half, or `athlete_deauthorization` when an athlete update
    /// revokes access.
    pub fn event_type(&self) -> String {
        let event_type = format!(
            "{}_{}",
            self.object_type.as_deref().unwrap_or(UNKNOWN),
            self.aspect_type.as_deref().unwrap_or(UNKNOWN)
        );
        if event_type == ATHLETE_UPDATE && revokes_authorization(&self.updates) {
            ATHLETE_DEAUTHORIZATION.to_string()
        } else {
            event_type
        }
    }

    pub fn athlete_id(&self) -> Option<String> {
        self.owner_id.clone()
    }

    pub fn object_id(&self) -> Option<String> {
        self.object_id.clone()
    }
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Strava signals deauthorization with `updates.authorized` set to false,
/// either as a boolean or the string `"false"`.
fn revokes_authorization(updates: &Value) -> bool {
    match updates.get("authorized") {
        Some(Value::Bool(authorized)) => !authorized,
        Some(Value::String(s)) => s == "false",
        _ => false,
    }
}

/// Whether a Strava event revokes our access to the athlete.
pub fn is_deauthorization(event_type: &str, payload: &Value) -> bool {
    match event_type {
        ATHLETE_DEAUTHORIZATION => true,
        ATHLETE_UPDATE => payload
            .get("updates")
            .is_some_and(revokes_authorization),
        _ => false,
    }
}

/// Normalizer for Strava events.
pub struct StravaNormalizer {
    store: Arc<dyn Store>,
    client: StravaClient,
}

impl StravaNormalizer {
    pub fn new(store: Arc<dyn Store>, client: StravaClient) -> Self {
        Self { store, client }
    }

    async fn fetch_activity(&self, event: &WebhookEvent) -> Result<Option<Value>> {
        let (Some(athlete_id), Some(activity_id)) = (
            event.strava_athlete_id.as_deref(),
            event.strava_object_id.as_deref(),
        ) else {
            tracing::warn!(event_id = %event.id, "Strava activity event without athlete or object ID");
            return Ok(None);
        };

        let token = self
            .store
            .find_connection(SOURCE, athlete_id)
            .await?
            .and_then(|conn| conn.access_token)
            .filter(|token| !token.is_empty());

        let Some(token) = token else {
            tracing::warn!(
                event_id = %event.id,
                athlete_id,
                "No Strava access token for athlete, skipping activity"
            );
            return Ok(None);
        };

        match self.client.get_activity(&token, activity_id).await? {
            ActivityFetch::Found(activity) => Ok(Some(activity)),
            ActivityFetch::Unavailable(reason) => {
                tracing::warn!(
                    event_id = %event.id,
                    activity_id,
                    reason = %reason,
                    "Strava activity unavailable, skipping"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Normalizer for StravaNormalizer {
    async fn normalize(
        &self,
        event: &WebhookEvent,
        owner: &MetricOwner,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<HealthMetric>> {
        match event.event_type.as_str() {
            ACTIVITY_CREATE | ACTIVITY_UPDATE => match self.fetch_activity(event).await? {
                Some(activity) => normalize_activity(&activity, owner, recorded_at),
                None => Ok(Vec::new()),
            },
            // Deletes and athlete events carry nothing to store
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StravaActivity {
    start_date: Option<String>,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    sport_type: Option<String>,
    moving_time: Option<f64>,
    distance: Option<f64>,
    average_heartrate: Option<f64>,
    calories: Option<f64>,
}

/// Metrics from a detailed Strava activity.
pub fn normalize_activity(
    activity_json: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let activity = StravaActivity::deserialize(activity_json)?;

    let Some(start) = activity.start_date.as_deref().and_then(parse_timestamp) else {
        tracing::debug!(?activity, "Skipping Strava activity without start_date");
        return Ok(Vec::new());
    };

    let metric = |metric_type: &str, value: f64, unit: &str| {
        HealthMetric::new(owner, SOURCE, metric_type, start, None, activity_json, recorded_at)
            .with_value(value, unit)
    };

    let activity_type = activity
        .activity_type
        .as_deref()
        .or(activity.sport_type.as_deref())
        .unwrap_or("Unknown");

    let mut metrics = vec![metric(
        "activity",
        activity.moving_time.unwrap_or(0.0) / 60.0,
        "minutes",
    )
    .with_text(activity_type)];

    if let Some(meters) = non_zero(activity.distance) {
        metrics.push(metric("distance", meters / 1000.0, "km"));
    }
    if let Some(bpm) = non_zero(activity.average_heartrate) {
        metrics.push(metric("avg_hr", bpm, "bpm"));
    }
    if let Some(kcal) = non_zero(activity.calories) {
        metrics.push(metric("calories", kcal, "kcal"));
    }

    Ok(metrics)
}
