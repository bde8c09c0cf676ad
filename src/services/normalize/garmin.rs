// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Health push payloads.
//!
//! Garmin pushes lists of summaries per summary type (`sleeps`, `dailies`,
//! ...). Each summary is normalized independently; fields that are absent
//! produce no metric rather than a zero.

use super::{non_zero, Normalizer};
use crate::error::Result;
use crate::models::{EventSource, HealthMetric, MetricOwner, WebhookEvent};
use crate::time_utils::{from_epoch, noon_utc, parse_calendar_date, parse_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

pub const SLEEPS: &str = "sleeps";
pub const STRESS_DETAILS: &str = "stressDetails";
pub const USER_METRICS: &str = "userMetrics";
pub const DAILIES: &str = "dailies";
pub const ACTIVITIES: &str = "activities";
pub const DEREGISTRATION: &str = "deregistration";

/// Valid stress scores; Garmin reports "unavailable" as negative values.
const STRESS_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

const SOURCE: EventSource = EventSource::Garmin;

/// Normalizer for Garmin events. Needs no I/O.
pub struct GarminNormalizer;

#[async_trait]
impl Normalizer for GarminNormalizer {
    async fn normalize(
        &self,
        event: &WebhookEvent,
        owner: &MetricOwner,
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<HealthMetric>> {
        normalize(&event.event_type, &event.payload, owner, recorded_at)
    }
}

/// Normalize a Garmin payload of the given summary type.
pub fn normalize(
    event_type: &str,
    payload: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let summary_fn: fn(&Value, &MetricOwner, DateTime<Utc>) -> Result<Vec<HealthMetric>> =
        match event_type {
            SLEEPS => sleep_metrics,
            STRESS_DETAILS => stress_metrics,
            USER_METRICS => user_metrics,
            DAILIES => daily_metrics,
            ACTIVITIES => activity_metrics,
            _ => {
                tracing::debug!(event_type, "Unhandled Garmin event type, no metrics");
                return Ok(Vec::new());
            }
        };

    let mut metrics = Vec::new();
    for summary in summaries(event_type, payload) {
        metrics.extend(summary_fn(summary, owner, recorded_at)?);
    }
    Ok(metrics)
}

/// Individual summaries in a push payload.
///
/// Accepts a bare array, the `{"<summaryType>": [...]}` envelope, or a single
/// summary object.
pub fn summaries<'a>(event_type: &str, payload: &'a Value) -> Vec<&'a Value> {
    match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get(event_type) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![payload],
        },
        _ => Vec::new(),
    }
}

/// Distinct Garmin user IDs across a payload's summaries, in order of
/// first appearance.
pub fn user_ids(event_type: &str, payload: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in summaries(event_type, payload)
        .into_iter()
        .filter_map(|s| id_string(s.get("userId")))
    {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Garmin user ID carried by a payload.
///
/// Taken from the first summary, falling back to the top level (where
/// deregistration notices carry it). A push mixing several users is
/// attributed to the first one.
pub fn user_id(event_type: &str, payload: &Value) -> Option<String> {
    if event_type == DEREGISTRATION {
        return id_string(payload.get("userId"));
    }

    let mut ids = user_ids(event_type, payload);
    if ids.len() > 1 {
        tracing::warn!(
            event_type,
            user_ids = ?ids,
            "Garmin push carries summaries for several users, attributing to the first"
        );
    }

    if ids.is_empty() {
        id_string(payload.get("userId"))
    } else {
        Some(ids.swap_remove(0))
    }
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a Garmin timestamp field against the summary's calendar date.
///
/// Numbers are epoch seconds or millis, strings are full timestamps or a
/// time of day; a missing field means midnight of the calendar date.
fn resolve_time(value: Option<&Value>, date: Option<NaiveDate>) -> Option<DateTime<Utc>> {
    match value {
        Some(Value::Number(n)) => n.as_i64().and_then(from_epoch),
        Some(Value::String(s)) => parse_timestamp(s).or_else(|| {
            let time = NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").ok()?;
            Some(Utc.from_utc_datetime(&date?.and_time(time)))
        }),
        _ => date.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
    }
}

fn calendar_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_calendar_date)
}

// ─── Sleep ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SleepSummary {
    calendar_date: Option<String>,
    #[serde(rename = "sleepStartTimestampGMT")]
    sleep_start_timestamp_gmt: Option<Value>,
    #[serde(rename = "sleepEndTimestampGMT")]
    sleep_end_timestamp_gmt: Option<Value>,
    sleep_time_seconds: Option<f64>,
    deep_sleep_seconds: Option<f64>,
    light_sleep_seconds: Option<f64>,
    rem_sleep_seconds: Option<f64>,
}

fn sleep_metrics(
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let sleep = SleepSummary::deserialize(summary)?;
    let date = calendar_date(sleep.calendar_date.as_deref());

    let (Some(start), Some(end), Some(total)) = (
        resolve_time(sleep.sleep_start_timestamp_gmt.as_ref(), date),
        resolve_time(sleep.sleep_end_timestamp_gmt.as_ref(), date),
        sleep.sleep_time_seconds,
    ) else {
        tracing::debug!(?sleep, "Skipping Garmin sleep summary without duration or date");
        return Ok(Vec::new());
    };

    let stages = [
        ("sleep", Some(total)),
        ("sleep_deep", non_zero(sleep.deep_sleep_seconds)),
        ("sleep_light", non_zero(sleep.light_sleep_seconds)),
        ("sleep_rem", non_zero(sleep.rem_sleep_seconds)),
    ];

    Ok(stages
        .into_iter()
        .filter_map(|(metric_type, seconds)| {
            seconds.map(|s| {
                HealthMetric::new(owner, SOURCE, metric_type, start, Some(end), summary, recorded_at)
                    .with_value(s / 60.0, "minutes")
            })
        })
        .collect())
}

// ─── Stress ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StressSummary {
    calendar_date: Option<String>,
    #[serde(rename = "startTimestampGMT")]
    start_timestamp_gmt: Option<Value>,
    start_time_in_seconds: Option<i64>,
    avg_stress_level: Option<f64>,
}

fn stress_metrics(
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let stress = StressSummary::deserialize(summary)?;

    let Some(level) = stress.avg_stress_level.filter(|l| STRESS_RANGE.contains(l)) else {
        return Ok(Vec::new());
    };

    let start = match stress.start_time_in_seconds {
        Some(secs) => from_epoch(secs),
        None => resolve_time(
            stress.start_timestamp_gmt.as_ref(),
            calendar_date(stress.calendar_date.as_deref()),
        ),
    };
    let Some(start) = start else {
        tracing::debug!(?stress, "Skipping Garmin stress summary without a timestamp");
        return Ok(Vec::new());
    };

    Ok(vec![HealthMetric::new(
        owner,
        SOURCE,
        "stress",
        start,
        None,
        summary,
        recorded_at,
    )
    .with_value(level, "score")])
}

// ─── User metrics ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserMetricsSummary {
    calendar_date: Option<String>,
    vo2_max: Option<f64>,
    vo2_max_cycling: Option<f64>,
    fitness_age: Option<f64>,
}

fn user_metrics(
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let metrics = UserMetricsSummary::deserialize(summary)?;
    let Some(date) = calendar_date(metrics.calendar_date.as_deref()) else {
        tracing::debug!(?metrics, "Skipping Garmin user metrics without calendar date");
        return Ok(Vec::new());
    };

    Ok(daily_values(
        noon_utc(date),
        [
            ("vo2max", metrics.vo2_max, "ml/kg/min"),
            ("vo2max_cycling", metrics.vo2_max_cycling, "ml/kg/min"),
            ("fitness_age", metrics.fitness_age, "years"),
        ],
        summary,
        owner,
        recorded_at,
    ))
}

// ─── Dailies ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailySummary {
    calendar_date: Option<String>,
    total_steps: Option<f64>,
    resting_heart_rate: Option<f64>,
    total_kilocalories: Option<f64>,
    total_distance_meters: Option<f64>,
}

fn daily_metrics(
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let daily = DailySummary::deserialize(summary)?;
    let Some(date) = calendar_date(daily.calendar_date.as_deref()) else {
        tracing::debug!(?daily, "Skipping Garmin daily summary without calendar date");
        return Ok(Vec::new());
    };

    Ok(daily_values(
        noon_utc(date),
        [
            ("steps", daily.total_steps, "steps"),
            ("resting_hr", daily.resting_heart_rate, "bpm"),
            ("calories", daily.total_kilocalories, "kcal"),
            ("distance", daily.total_distance_meters.map(|m| m / 1000.0), "km"),
        ],
        summary,
        owner,
        recorded_at,
    ))
}

/// One metric per present value, all anchored at the same daily timestamp.
fn daily_values<const N: usize>(
    anchor: DateTime<Utc>,
    values: [(&str, Option<f64>, &str); N],
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Vec<HealthMetric> {
    values
        .into_iter()
        .filter_map(|(metric_type, value, unit)| {
            value.map(|v| {
                HealthMetric::new(owner, SOURCE, metric_type, anchor, None, summary, recorded_at)
                    .with_value(v, unit)
            })
        })
        .collect()
}

// ─── Activities ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivitySummary {
    activity_type: Option<String>,
    #[serde(rename = "startTimeGMT")]
    start_time_gmt: Option<Value>,
    start_time_local: Option<Value>,
    start_time_in_seconds: Option<i64>,
    #[serde(alias = "durationInSeconds")]
    duration_seconds: Option<f64>,
}

fn activity_metrics(
    summary: &Value,
    owner: &MetricOwner,
    recorded_at: DateTime<Utc>,
) -> Result<Vec<HealthMetric>> {
    let activity = ActivitySummary::deserialize(summary)?;

    let start = activity
        .start_time_gmt
        .as_ref()
        .or(activity.start_time_local.as_ref())
        .and_then(|v| resolve_time(Some(v), None))
        .or_else(|| activity.start_time_in_seconds.and_then(from_epoch));

    let (Some(activity_type), Some(start)) = (activity.activity_type.as_deref(), start) else {
        tracing::debug!(?activity, "Skipping Garmin activity without type or start time");
        return Ok(Vec::new());
    };

    let mut metric =
        HealthMetric::new(owner, SOURCE, "activity", start, None, summary, recorded_at)
            .with_text(activity_type);
    metric.unit = Some("minutes".to_string());
    metric.value_num = activity.duration_seconds.map(|s| s / 60.0);

    Ok(vec![metric])
}
