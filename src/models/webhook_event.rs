// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Queued webhook event and its processing state machine.
//!
//! ```text
//! pending ──ok──────────────▶ completed      (terminal)
//!    │ ▲
//!    │ └─error, attempts < max (re-armed with backoff)
//!    └───error, attempts >= max ▶ dead_letter (terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest `last_error` we keep on an event.
const MAX_ERROR_LEN: usize = 500;

/// Provider that delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Garmin,
    Strava,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Garmin => "garmin",
            EventSource::Strava => "strava",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for (re)processing.
    Pending,
    /// Processed successfully.
    Completed,
    /// Transient failure label. The processor re-arms failures as `Pending`,
    /// so rows in this state are never picked up.
    Failed,
    /// Attempts exhausted; needs manual remediation.
    DeadLetter,
}

impl EventStatus {
    /// Terminal states are never transitioned again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::DeadLetter)
    }
}

/// A queued unit of work (`webhook_events` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID (also used as document ID)
    pub id: String,
    pub source: EventSource,
    /// Provider-defined event type (`sleeps`, `activity_create`, ...)
    pub event_type: String,
    /// Raw provider payload, kept verbatim
    pub payload: serde_json::Value,
    /// Resolved internal user, if known
    pub user_id: Option<String>,
    /// Resolved internal profile, if known
    pub profile_id: Option<String>,
    /// Garmin user ID from the payload
    pub garmin_user_id: Option<String>,
    /// Strava athlete (owner) ID
    pub strava_athlete_id: Option<String>,
    /// Strava object (activity) ID
    pub strava_object_id: Option<String>,
    pub status: EventStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub received_at: DateTime<Utc>,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl WebhookEvent {
    /// Create a new pending event with no resolved identity.
    pub fn new(
        source: EventSource,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        max_attempts: u32,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            event_type: event_type.into(),
            payload,
            user_id: None,
            profile_id: None,
            garmin_user_id: None,
            strava_athlete_id: None,
            strava_object_id: None,
            status: EventStatus::Pending,
            attempts: 0,
            max_attempts,
            next_retry_at: None,
            received_at,
            processed_at: None,
            last_error: None,
        }
    }

    /// Provider-native identifier used for identity resolution.
    pub fn external_user_id(&self) -> Option<&str> {
        match self.source {
            EventSource::Garmin => self.garmin_user_id.as_deref(),
            EventSource::Strava => self.strava_athlete_id.as_deref(),
        }
    }

    /// Whether the event is eligible for pickup at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Pending && self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Transition to `completed`. No-op on terminal events.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = EventStatus::Completed;
        self.processed_at = Some(now);
        self.next_retry_at = None;
    }

    /// Record a failed attempt, either re-arming with backoff or dead-lettering.
    ///
    /// Returns the resulting status. Terminal events are left untouched.
    pub fn record_failure(
        &mut self,
        error: &str,
        now: DateTime<Utc>,
        retry_base: Duration,
    ) -> EventStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(truncate_error(error));

        if self.attempts >= self.max_attempts {
            self.status = EventStatus::DeadLetter;
            self.next_retry_at = None;
        } else {
            let delay = chrono::Duration::from_std(retry_delay(self.attempts, retry_base))
                .unwrap_or_else(|_| chrono::Duration::weeks(52));
            self.status = EventStatus::Pending;
            self.next_retry_at = Some(
                now.checked_add_signed(delay)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
        }

        self.status
    }
}

/// Backoff delay after the given (1-based) attempt: `base * 2^(attempts-1)`.
pub fn retry_delay(attempts: u32, base: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => error[..idx].to_string(),
        None => error.to_string(),
    }
}
