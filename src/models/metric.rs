// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Canonical health metric record.

use crate::models::EventSource;
use crate::services::dedupe::dedupe_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal identity a metric is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricOwner {
    pub user_id: String,
    pub profile_id: String,
}

/// One normalized observation (`health_metrics` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
    pub user_id: String,
    pub profile_id: String,
    pub source: EventSource,
    /// Open vocabulary: `steps`, `sleep`, `sleep_deep`, `stress`, `vo2max`, ...
    pub metric_type: String,
    pub value_num: Option<f64>,
    /// Categorical value (e.g. activity type)
    pub value_text: Option<String>,
    pub unit: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    /// When we ingested the observation, not when it happened
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub recorded_at: DateTime<Utc>,
    /// Provider element the metric came from
    pub raw_payload: serde_json::Value,
    /// Idempotency key (also used as document ID)
    pub dedupe_hash: String,
}

impl HealthMetric {
    /// Create a metric with no value; the dedupe hash is derived here.
    pub fn new(
        owner: &MetricOwner,
        source: EventSource,
        metric_type: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        raw_payload: &serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: owner.user_id.clone(),
            profile_id: owner.profile_id.clone(),
            source,
            metric_type: metric_type.to_string(),
            value_num: None,
            value_text: None,
            unit: None,
            start_time,
            end_time,
            recorded_at,
            raw_payload: raw_payload.clone(),
            dedupe_hash: dedupe_hash(source, metric_type, start_time, end_time),
        }
    }

    pub fn with_value(mut self, value: f64, unit: &str) -> Self {
        self.value_num = Some(value);
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.value_text = Some(text.into());
        self
    }
}
