// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching activity detail.
//!
//! Webhook events only reference an activity by ID, so the processor fetches
//! the full record here. Every call is bounded by a hard timeout.
//!
//! Failure classes:
//! - timeout, transport error, 429, 5xx → `Err`, retried by the processor
//! - any other non-success status → [`ActivityFetch::Unavailable`], skipped

use crate::error::AppError;
use std::time::Duration;

/// Outcome of an activity detail fetch that did not need a retry.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityFetch {
    /// Full activity JSON as returned by Strava.
    Found(serde_json::Value),
    /// Strava answered but will not give us the activity (revoked token,
    /// deleted or private activity, ...). Retrying won't help.
    Unavailable(String),
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl StravaClient {
    /// Create a client for the given API base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: &str,
    ) -> Result<ActivityFetch, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        let request = async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| AppError::StravaApi(e.to_string()))?;
            self.check_response_json(response).await
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(AppError::UpstreamTimeout(format!(
                "Strava activity {} fetch exceeded {:?}",
                activity_id, self.timeout
            ))),
        }
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json(
        &self,
        response: reqwest::Response,
    ) -> Result<ActivityFetch, AppError> {
        let status = response.status();

        if status.is_success() {
            let body = response
                .json()
                .await
                .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))?;
            return Ok(ActivityFetch::Found(body));
        }

        let body = response.text().await.unwrap_or_default();

        // Rate limit - retry later with backoff
        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
            return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
        }

        if status.is_server_error() {
            return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
        }

        Ok(ActivityFetch::Unavailable(format!("HTTP {}: {}", status, body)))
    }
}
