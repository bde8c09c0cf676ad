// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maps provider-native user IDs to internal users and profiles.

use crate::db::Store;
use crate::error::Result;
use crate::models::{EventSource, ResolvedIdentity};
use std::sync::Arc;

/// Resolves provider identities through the connection store.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve a Garmin user ID / Strava athlete ID to an internal identity.
    ///
    /// Disconnected connections still resolve: events queued before a
    /// deauthorization (and the deauthorization itself) belong to that user.
    pub async fn resolve(
        &self,
        provider: EventSource,
        external_user_id: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        let connection = self
            .store
            .find_connection(provider, external_user_id)
            .await?;

        match connection {
            Some(conn) => {
                tracing::debug!(
                    provider = %provider,
                    external_user_id,
                    user_id = %conn.user_id,
                    "Resolved provider identity"
                );
                Ok(Some(ResolvedIdentity::from(&conn)))
            }
            None => {
                tracing::warn!(
                    provider = %provider,
                    external_user_id,
                    "No connection found for provider identity"
                );
                Ok(None)
            }
        }
    }

    /// Primary profile of a user, used when the connection carries none.
    pub async fn primary_profile_id(&self, user_id: &str) -> Result<Option<String>> {
        self.store.primary_profile_id(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::ProviderConnection;

    fn store_with_connection(profile_id: &str) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_connection(ProviderConnection {
            provider: EventSource::Garmin,
            external_user_id: "garmin-1".to_string(),
            user_id: "user-1".to_string(),
            profile_id: profile_id.to_string(),
            access_token: None,
            is_connected: false,
            disconnected_at: None,
        });
        store
    }

    #[tokio::test]
    async fn test_resolve_known_identity() {
        let resolver = IdentityResolver::new(store_with_connection("profile-1"));

        let identity = resolver
            .resolve(EventSource::Garmin, "garmin-1")
            .await
            .unwrap()
            .expect("identity should resolve");
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.profile_id.as_deref(), Some("profile-1"));
    }

    #[tokio::test]
    async fn test_resolve_is_scoped_by_provider() {
        let resolver = IdentityResolver::new(store_with_connection("profile-1"));

        assert!(resolver
            .resolve(EventSource::Strava, "garmin-1")
            .await
            .unwrap()
            .is_none());
        assert!(resolver
            .resolve(EventSource::Garmin, "unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_connection_without_profile() {
        let resolver = IdentityResolver::new(store_with_connection(""));

        let identity = resolver
            .resolve(EventSource::Garmin, "garmin-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.profile_id, None);
    }
}
