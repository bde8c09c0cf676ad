// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::response::Response;
use std::sync::Arc;
use welltrack_ingest::config::Config;
use welltrack_ingest::db::{FirestoreDb, InMemoryStore, Store};
use welltrack_ingest::models::{EventSource, Profile, ProviderConnection};
use welltrack_ingest::routes::create_router;
use welltrack_ingest::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store for inspection.
#[allow(dead_code)]
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(AppState::new(config, store.clone()));
    (create_router(state.clone()), state, store)
}

/// Create a test app whose every database call fails.
#[allow(dead_code)]
pub fn create_offline_test_app(config: Config) -> axum::Router {
    let db: Arc<dyn Store> = Arc::new(FirestoreDb::new_mock());
    create_router(Arc::new(AppState::new(config, db)))
}

/// A connected provider account.
#[allow(dead_code)]
pub fn connection(
    provider: EventSource,
    external_user_id: &str,
    user_id: &str,
    profile_id: &str,
    access_token: Option<&str>,
) -> ProviderConnection {
    ProviderConnection {
        provider,
        external_user_id: external_user_id.to_string(),
        user_id: user_id.to_string(),
        profile_id: profile_id.to_string(),
        access_token: access_token.map(str::to_string),
        is_connected: true,
        disconnected_at: None,
    }
}

#[allow(dead_code)]
pub fn primary_profile(id: &str, user_id: &str) -> Profile {
    Profile {
        id: id.to_string(),
        user_id: user_id.to_string(),
        is_primary: true,
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Serve `app` on an ephemeral local port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
