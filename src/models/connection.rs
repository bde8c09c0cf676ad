// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider connections and profiles (owned by the account side, read here).

use crate::models::EventSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link between a provider account and an internal profile
/// (`health_connections` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub provider: EventSource,
    /// Garmin user ID or Strava athlete ID
    pub external_user_id: String,
    pub user_id: String,
    pub profile_id: String,
    /// Strava bearer token for detail fetches
    pub access_token: Option<String>,
    pub is_connected: bool,
    #[serde(default, with = "firestore::serialize_as_optional_timestamp")]
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl ProviderConnection {
    /// Document ID for a provider + external ID pair.
    pub fn document_id(provider: EventSource, external_user_id: &str) -> String {
        format!("{}_{}", provider, external_user_id)
    }
}

/// User profile (`profiles` collection). A user may own several; one is primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile ID (also used as document ID)
    pub id: String,
    pub user_id: String,
    pub is_primary: bool,
}

/// Result of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: String,
    pub profile_id: Option<String>,
}

impl From<&ProviderConnection> for ResolvedIdentity {
    fn from(conn: &ProviderConnection) -> Self {
        Self {
            user_id: conn.user_id.clone(),
            profile_id: Some(conn.profile_id.clone()).filter(|p| !p.is_empty()),
        }
    }
}
