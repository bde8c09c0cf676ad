// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Configuration is read once at startup and handed to components through
//! `AppState`; nothing below the binary reads the environment directly.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Google Cloud Firestore (or its emulator).
    Firestore,
    /// Process-local store, for development only.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// How an ingestion endpoint answers the provider when queuing fails.
///
/// Providers disable subscriptions that keep failing, so the default is to
/// acknowledge everything and accept that a failed insert loses the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Always answer `200 {"status":"received"}`.
    #[default]
    AlwaysAcknowledge,
    /// Answer 500 when the event could not be queued, so the provider redelivers.
    Strict,
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" | "always_acknowledge" => Ok(Self::AlwaysAcknowledge),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown ack policy '{}'", other)),
        }
    }
}

/// What the processor does with an event whose identity cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedIdentityPolicy {
    /// Mark the event completed without producing metrics.
    #[default]
    Complete,
    /// Treat it as a retryable failure, so it backs off and eventually dead-letters.
    Retry,
}

impl FromStr for UnresolvedIdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "retry" => Ok(Self::Retry),
            other => Err(format!("unknown unresolved identity policy '{}'", other)),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Persistence backend
    pub store_backend: StoreBackend,

    // --- Strava ---
    /// Shared secret echoed during subscription verification
    pub strava_verify_token: String,
    /// Expected push subscription ID; unchecked when unset
    pub strava_subscription_id: Option<u64>,
    /// Strava REST API base URL
    pub strava_api_url: String,
    /// Hard timeout on the activity detail fetch
    pub strava_fetch_timeout: Duration,

    // --- Queue / processor ---
    /// `max_attempts` stamped onto newly queued events
    pub max_attempts: u32,
    /// Backoff base; attempt `n` waits `base * 2^(n-1)`
    pub retry_base: Duration,
    /// Batch size used when the trigger does not specify one
    pub default_batch_size: usize,
    /// Upper bound on a requested batch size
    pub max_batch_size: usize,
    /// Ingestion acknowledgement policy
    pub ack_policy: AckPolicy,
    /// Largest webhook body read before the delivery is treated as unreadable
    pub webhook_body_limit: usize,
    /// Handling of events with no resolvable identity
    pub unresolved_identity_policy: UnresolvedIdentityPolicy,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8080,
            gcp_project_id: "test-project".to_string(),
            store_backend: StoreBackend::Memory,
            strava_verify_token: "test_verify_token".to_string(),
            strava_subscription_id: None,
            strava_api_url: DEFAULT_STRAVA_API_URL.to_string(),
            strava_fetch_timeout: Duration::from_secs(10),
            max_attempts: 5,
            retry_base: Duration::from_secs(60),
            default_batch_size: 10,
            max_batch_size: 100,
            ack_policy: AckPolicy::AlwaysAcknowledge,
            webhook_body_limit: DEFAULT_WEBHOOK_BODY_LIMIT,
            unresolved_identity_policy: UnresolvedIdentityPolicy::Complete,
        }
    }
}

const DEFAULT_STRAVA_API_URL: &str = "https://www.strava.com/api/v3";

/// Garmin backfills can push many days of summaries in one request.
const DEFAULT_WEBHOOK_BODY_LIMIT: usize = 16 * 1024 * 1024;

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strava_subscription_id = match lookup("STRAVA_SUBSCRIPTION_ID") {
            Some(raw) if !raw.trim().is_empty() => Some(parse_value(
                "STRAVA_SUBSCRIPTION_ID",
                &raw,
            )?),
            _ => None,
        };

        let config = Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            gcp_project_id: lookup("GCP_PROJECT_ID").unwrap_or_else(|| "local-dev".to_string()),
            store_backend: parse_or(&lookup, "STORE_BACKEND", StoreBackend::Firestore)?,
            strava_verify_token: lookup("STRAVA_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing("STRAVA_VERIFY_TOKEN"))?,
            strava_subscription_id,
            strava_api_url: lookup("STRAVA_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STRAVA_API_URL.to_string()),
            strava_fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "STRAVA_FETCH_TIMEOUT_SECS",
                10,
            )?),
            max_attempts: parse_or(&lookup, "WEBHOOK_MAX_ATTEMPTS", 5)?,
            retry_base: Duration::from_secs(parse_or(&lookup, "WEBHOOK_RETRY_BASE_SECS", 60)?),
            default_batch_size: parse_or(&lookup, "PROCESS_BATCH_SIZE", 10)?,
            max_batch_size: parse_or(&lookup, "PROCESS_MAX_BATCH_SIZE", 100)?,
            ack_policy: parse_or(&lookup, "WEBHOOK_ACK_POLICY", AckPolicy::AlwaysAcknowledge)?,
            webhook_body_limit: parse_or(
                &lookup,
                "WEBHOOK_MAX_BODY_BYTES",
                DEFAULT_WEBHOOK_BODY_LIMIT,
            )?,
            unresolved_identity_policy: parse_or(
                &lookup,
                "UNRESOLVED_IDENTITY_POLICY",
                UnresolvedIdentityPolicy::Complete,
            )?,
        };

        if config.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "WEBHOOK_MAX_ATTEMPTS",
                "must be at least 1".to_string(),
            ));
        }
        if config.max_batch_size == 0 || config.default_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "PROCESS_BATCH_SIZE",
                "batch sizes must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Clamp a requested batch size into `[1, max_batch_size]`.
    pub fn clamp_batch_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_batch_size)
            .clamp(1, self.max_batch_size)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
