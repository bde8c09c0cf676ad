// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Batch processor tests: retry state machine, batch isolation, idempotent
//! metric writes and the Strava detail fetch against a local stand-in API.

mod common;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{connection, create_test_app, primary_profile, spawn_server};
use serde_json::json;
use std::sync::Arc;
use welltrack_ingest::config::Config;
use welltrack_ingest::db::{InMemoryStore, Store};
use welltrack_ingest::models::{EventSource, EventStatus, WebhookEvent};
use welltrack_ingest::services::BatchSummary;
use welltrack_ingest::AppState;

const STRAVA_TOKEN: &str = "token-abc";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 16, 8, 0, 0).unwrap()
}

fn setup(config: Config) -> (Arc<AppState>, Arc<InMemoryStore>) {
    let (_, state, store) = create_test_app(config);
    store.add_connection(connection(EventSource::Garmin, "garmin-1", "user-1", "profile-1", None));
    store.add_connection(connection(
        EventSource::Strava,
        "134815",
        "user-1",
        "profile-1",
        Some(STRAVA_TOKEN),
    ));
    store.add_connection(connection(EventSource::Strava, "555", "user-2", "", None));
    store.add_profile(primary_profile("profile-2", "user-2"));
    (state, store)
}

async fn queue_garmin(
    store: &InMemoryStore,
    event_type: &str,
    payload: serde_json::Value,
    received_at: DateTime<Utc>,
) -> String {
    let mut event = WebhookEvent::new(EventSource::Garmin, event_type, payload, 5, received_at);
    event.garmin_user_id = Some("garmin-1".to_string());
    store.insert_event(&event).await.unwrap();
    event.id
}

async fn queue_strava(store: &InMemoryStore, event_type: &str, athlete: &str, object: &str) -> String {
    let mut event = WebhookEvent::new(
        EventSource::Strava,
        event_type,
        json!({ "object_id": object, "owner_id": athlete }),
        5,
        t0(),
    );
    event.strava_athlete_id = Some(athlete.to_string());
    event.strava_object_id = Some(object.to_string());
    store.insert_event(&event).await.unwrap();
    event.id
}

async fn status_of(store: &InMemoryStore, id: &str) -> WebhookEvent {
    store.get_event(id).await.unwrap().expect("event exists")
}

fn stress(level: serde_json::Value) -> serde_json::Value {
    json!([{ "calendarDate": "2024-01-15", "startTimeInSeconds": 1705356000, "avgStressLevel": level }])
}

#[tokio::test]
async fn test_batch_isolation() {
    let (state, store) = setup(Config::test_default());
    let first = queue_garmin(&store, "stressDetails", stress(json!(40)), t0()).await;
    let broken = queue_garmin(
        &store,
        "stressDetails",
        stress(json!("not a number")),
        t0() + Duration::seconds(1),
    )
    .await;
    let third = queue_garmin(
        &store,
        "dailies",
        json!([{ "calendarDate": "2024-01-15", "totalSteps": 4000 }]),
        t0() + Duration::seconds(2),
    )
    .await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 2, failed: 1 });

    assert_eq!(status_of(&store, &first).await.status, EventStatus::Completed);
    assert_eq!(status_of(&store, &third).await.status, EventStatus::Completed);

    let broken = status_of(&store, &broken).await;
    assert_eq!(broken.status, EventStatus::Pending);
    assert_eq!(broken.attempts, 1);
    assert!(broken.last_error.unwrap().contains("Malformed payload"));

    let types: Vec<String> = store.metrics().into_iter().map(|m| m.metric_type).collect();
    assert_eq!(types, vec!["steps", "stress"]);
}

#[tokio::test]
async fn test_extreme_epoch_does_not_stall_batch() {
    let (state, store) = setup(Config::test_default());
    let extreme = queue_garmin(
        &store,
        "stressDetails",
        json!([{ "startTimeInSeconds": i64::MIN, "avgStressLevel": 40 }]),
        t0(),
    )
    .await;
    let dailies = queue_garmin(
        &store,
        "dailies",
        json!([{ "calendarDate": "2024-01-15", "totalSteps": 4000 }]),
        t0() + Duration::seconds(1),
    )
    .await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 2, failed: 0 });

    // Unrepresentable start time means no stress sample, not a failure
    assert_eq!(status_of(&store, &extreme).await.status, EventStatus::Completed);
    assert_eq!(status_of(&store, &dailies).await.status, EventStatus::Completed);

    let types: Vec<String> = store.metrics().into_iter().map(|m| m.metric_type).collect();
    assert_eq!(types, vec!["steps"]);
}

#[tokio::test]
async fn test_backoff_until_dead_letter() {
    let (state, store) = setup(Config::test_default());
    let id = queue_garmin(&store, "stressDetails", stress(json!("bad")), t0()).await;

    let mut now = t0();
    for (attempt, delay) in [(1, 60), (2, 120), (3, 240), (4, 480)] {
        let summary = state.processor.process_at(10, now).await.unwrap();
        assert_eq!(summary.failed, 1);

        let event = status_of(&store, &id).await;
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.attempts, attempt);
        assert_eq!(event.next_retry_at, Some(now + Duration::seconds(delay)));

        // Not due before the backoff elapses
        let early = state
            .processor
            .process_at(10, now + Duration::seconds(delay - 1))
            .await
            .unwrap();
        assert_eq!(early, BatchSummary::default());

        now += Duration::seconds(delay);
    }

    state.processor.process_at(10, now).await.unwrap();
    let event = status_of(&store, &id).await;
    assert_eq!(event.status, EventStatus::DeadLetter);
    assert_eq!(event.attempts, 5);
    assert_eq!(event.next_retry_at, None);

    // Never picked up again
    let later = state
        .processor
        .process_at(10, now + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(later, BatchSummary::default());
}

#[tokio::test]
async fn test_batch_size_bounds_work() {
    let (state, store) = setup(Config::test_default());
    for i in 0..3 {
        queue_garmin(&store, "dailies", json!([]), t0() + Duration::seconds(i)).await;
    }

    let summary = state.processor.process_at(2, t0()).await.unwrap();
    assert_eq!(summary.processed, 2);
    let summary = state.processor.process_at(2, t0()).await.unwrap();
    assert_eq!(summary.processed, 1);
}

#[tokio::test]
async fn test_redelivered_payload_is_idempotent() {
    let (state, store) = setup(Config::test_default());
    let payload = json!([{
        "calendarDate": "2024-01-15",
        "sleepTimeSeconds": 28800,
        "deepSleepSeconds": 3600
    }]);
    queue_garmin(&store, "sleeps", payload.clone(), t0()).await;
    queue_garmin(&store, "sleeps", payload, t0() + Duration::seconds(5)).await;

    state.processor.process_at(10, t0()).await.unwrap();

    let metrics = store.metrics();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].metric_type, "sleep");
    assert_eq!(metrics[0].value_num, Some(480.0));
    assert_eq!(metrics[1].metric_type, "sleep_deep");
    assert_eq!(metrics[1].value_num, Some(60.0));
}

#[tokio::test]
async fn test_garmin_deregistration_disconnects() {
    let (state, store) = setup(Config::test_default());
    let id = queue_garmin(&store, "deregistration", json!({ "userId": "garmin-1" }), t0()).await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary.processed, 1);

    assert_eq!(status_of(&store, &id).await.status, EventStatus::Completed);
    let conn = store.connection(EventSource::Garmin, "garmin-1").unwrap();
    assert!(!conn.is_connected);
    assert_eq!(conn.disconnected_at, Some(t0()));
    assert!(store.metrics().is_empty());
}

// ─── Strava detail fetch ─────────────────────────────────────────

async fn fake_activity(Path(id): Path<String>, headers: HeaderMap) -> axum::response::Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(&format!("Bearer {}", STRAVA_TOKEN)[..]);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match id.as_str() {
        "404" => StatusCode::NOT_FOUND.into_response(),
        "429" => StatusCode::TOO_MANY_REQUESTS.into_response(),
        "500" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response(),
        "slow" => {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        _ => Json(json!({
            "id": id,
            "type": "Ride",
            "start_date": "2024-01-15T07:00:00Z",
            "moving_time": 3600,
            "distance": 25000.0,
            "average_heartrate": 140.0
        }))
        .into_response(),
    }
}

async fn strava_setup() -> (Arc<AppState>, Arc<InMemoryStore>) {
    let base_url = spawn_server(Router::new().route("/activities/{id}", get(fake_activity))).await;
    setup(Config {
        strava_api_url: base_url,
        strava_fetch_timeout: std::time::Duration::from_millis(300),
        ..Config::test_default()
    })
}

#[tokio::test]
async fn test_strava_activity_fetched_and_normalized() {
    let (state, store) = strava_setup().await;
    let id = queue_strava(&store, "activity_create", "134815", "1001").await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(status_of(&store, &id).await.status, EventStatus::Completed);

    let metrics = store.metrics();
    let types: Vec<&str> = metrics.iter().map(|m| m.metric_type.as_str()).collect();
    assert_eq!(types, vec!["activity", "avg_hr", "distance"]);
    assert!(metrics.iter().all(|m| m.user_id == "user-1" && m.profile_id == "profile-1"));
    assert_eq!(metrics[0].value_text.as_deref(), Some("Ride"));
    assert_eq!(metrics[0].value_num, Some(60.0));
    assert_eq!(metrics[2].value_num, Some(25.0));
}

#[tokio::test]
async fn test_strava_not_found_completes_without_metrics() {
    let (state, store) = strava_setup().await;
    let id = queue_strava(&store, "activity_create", "134815", "404").await;

    state.processor.process_at(10, t0()).await.unwrap();

    let event = status_of(&store, &id).await;
    assert_eq!(event.status, EventStatus::Completed);
    assert_eq!(event.attempts, 0);
    assert!(store.metrics().is_empty());
}

#[tokio::test]
async fn test_strava_missing_token_completes_without_metrics() {
    let (state, store) = strava_setup().await;
    // user-2's connection has no token; profile comes from the primary profile
    let id = queue_strava(&store, "activity_create", "555", "1001").await;

    state.processor.process_at(10, t0()).await.unwrap();

    let event = status_of(&store, &id).await;
    assert_eq!(event.status, EventStatus::Completed);
    assert_eq!(event.profile_id.as_deref(), Some("profile-2"));
    assert!(store.metrics().is_empty());
}

#[tokio::test]
async fn test_strava_server_error_and_rate_limit_retry() {
    let (state, store) = strava_setup().await;
    let down = queue_strava(&store, "activity_update", "134815", "500").await;
    let limited = queue_strava(&store, "activity_update", "134815", "429").await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary.failed, 2);

    let down = status_of(&store, &down).await;
    assert_eq!(down.status, EventStatus::Pending);
    assert_eq!(down.attempts, 1);
    assert!(down.last_error.unwrap().contains("500"));

    let limited = status_of(&store, &limited).await;
    assert_eq!(limited.attempts, 1);
    assert!(limited.last_error.unwrap().contains("Rate limit exceeded"));
}

#[tokio::test]
async fn test_strava_timeout_is_retryable() {
    let (state, store) = strava_setup().await;
    let id = queue_strava(&store, "activity_create", "134815", "slow").await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary.failed, 1);

    let event = status_of(&store, &id).await;
    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.next_retry_at, Some(t0() + Duration::seconds(60)));
    assert!(event.last_error.unwrap().contains("Upstream timeout"));
}

#[tokio::test]
async fn test_strava_delete_and_deauthorization() {
    let (state, store) = strava_setup().await;
    let delete = queue_strava(&store, "activity_delete", "134815", "1001").await;
    let deauth = queue_strava(&store, "athlete_deauthorization", "134815", "134815").await;

    let summary = state.processor.process_at(10, t0()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 2, failed: 0 });

    assert_eq!(status_of(&store, &delete).await.status, EventStatus::Completed);
    assert_eq!(status_of(&store, &deauth).await.status, EventStatus::Completed);
    assert!(store.metrics().is_empty());

    let conn = store.connection(EventSource::Strava, "134815").unwrap();
    assert!(!conn.is_connected);
    assert_eq!(conn.disconnected_at, Some(t0()));
}
