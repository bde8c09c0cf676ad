// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (`FIRESTORE_EMULATOR_HOST`); they are skipped otherwise.

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use welltrack_ingest::db::Store;
use welltrack_ingest::models::{
    EventSource, EventStatus, HealthMetric, MetricOwner, WebhookEvent,
};

mod common;
use common::{connection, primary_profile, test_db};

/// Generate a unique ID for test isolation.
fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_event_roundtrip_and_due_selection() {
    require_emulator!();

    let db = test_db().await;
    // Far future keeps this test's rows apart from anything left by other runs
    let now = Utc.with_ymd_and_hms(2090, 1, 1, 0, 0, 0).unwrap();

    let mut event = WebhookEvent::new(EventSource::Garmin, "sleeps", json!([]), 5, now);
    event.garmin_user_id = Some(unique_id("garmin"));
    db.insert_event(&event).await.unwrap();

    // Same ID cannot be inserted twice
    assert!(db.insert_event(&event).await.is_err());

    let stored = db.get_event(&event.id).await.unwrap().expect("stored");
    assert_eq!(stored, event);

    let due = db.due_events(now, 500).await.unwrap();
    assert!(due.iter().any(|e| e.id == event.id));

    event.record_failure("boom", now, std::time::Duration::from_secs(60));
    db.update_event(&event).await.unwrap();

    let due = db.due_events(now, 500).await.unwrap();
    assert!(!due.iter().any(|e| e.id == event.id), "backing off");

    let due = db
        .due_events(now + Duration::seconds(60), 500)
        .await
        .unwrap();
    let found = due.iter().find(|e| e.id == event.id).expect("due again");
    assert_eq!(found.attempts, 1);
    assert_eq!(found.status, EventStatus::Pending);
}

#[tokio::test]
async fn test_due_events_oldest_first() {
    require_emulator!();

    let db = test_db().await;
    let now = Utc.with_ymd_and_hms(2092, 6, 1, 0, 0, 0).unwrap();

    let newer = WebhookEvent::new(EventSource::Garmin, "dailies", json!([]), 5, now);
    let older = WebhookEvent::new(
        EventSource::Garmin,
        "dailies",
        json!([]),
        5,
        now - Duration::minutes(5),
    );
    db.insert_event(&newer).await.unwrap();
    db.insert_event(&older).await.unwrap();

    let due = db.due_events(now, 500).await.unwrap();
    let position = |id: &str| due.iter().position(|e| e.id == id).expect("due");
    assert!(position(&older.id) < position(&newer.id));
    assert!(due
        .windows(2)
        .all(|pair| pair[0].received_at <= pair[1].received_at));
}

#[tokio::test]
async fn test_metric_upsert_by_hash() {
    require_emulator!();

    let db = test_db().await;
    let owner = MetricOwner {
        user_id: unique_id("user"),
        profile_id: unique_id("profile"),
    };
    let start = Utc.with_ymd_and_hms(2091, 3, 4, 12, 0, 0).unwrap();
    let raw = json!({ "totalSteps": 10 });

    let first = HealthMetric::new(&owner, EventSource::Garmin, "steps", start, None, &raw, start)
        .with_value(10.0, "steps");
    let second = HealthMetric::new(
        &owner,
        EventSource::Garmin,
        "steps",
        start,
        None,
        &raw,
        start + Duration::hours(1),
    )
    .with_value(12.0, "steps");
    assert_eq!(first.dedupe_hash, second.dedupe_hash);

    db.upsert_metrics(&[first]).await.unwrap();
    db.upsert_metrics(&[second.clone()]).await.unwrap();

    let stored = db.get_metric(&second.dedupe_hash).await.unwrap().unwrap();
    assert_eq!(stored.value_num, Some(12.0));
    assert_eq!(stored.recorded_at, second.recorded_at);
}

#[tokio::test]
async fn test_connection_lookup_and_disconnect() {
    require_emulator!();

    let db = test_db().await;
    let athlete = unique_id("athlete");
    let user = unique_id("user");
    let profile = unique_id("profile");

    db.upsert_connection(&connection(EventSource::Strava, &athlete, &user, "", Some("tok")))
        .await
        .unwrap();
    db.upsert_profile(&primary_profile(&profile, &user))
        .await
        .unwrap();

    let found = db
        .find_connection(EventSource::Strava, &athlete)
        .await
        .unwrap()
        .expect("connection");
    assert_eq!(found.user_id, user);
    assert!(db
        .find_connection(EventSource::Garmin, &athlete)
        .await
        .unwrap()
        .is_none());

    assert_eq!(db.primary_profile_id(&user).await.unwrap(), Some(profile));

    let at = Utc::now();
    assert_eq!(
        db.mark_disconnected(EventSource::Strava, &athlete, at)
            .await
            .unwrap(),
        1
    );
    let after = db
        .find_connection(EventSource::Strava, &athlete)
        .await
        .unwrap()
        .unwrap();
    assert!(!after.is_connected);
    assert!(after.disconnected_at.is_some());
    // Token untouched by the field-masked update
    assert_eq!(after.access_token.as_deref(), Some("tok"));

    assert_eq!(
        db.mark_disconnected(EventSource::Strava, "nobody", at)
            .await
            .unwrap(),
        0
    );
}
