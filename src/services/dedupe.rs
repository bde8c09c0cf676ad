// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Idempotency key for metric upserts.

use crate::models::EventSource;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// SHA-256 over `source:metric_type:start:end`, hex encoded.
///
/// Timestamps are rendered canonically (UTC, whole seconds, `Z`), so the same
/// observation hashes identically however the provider formatted it.
pub fn dedupe_hash(
    source: EventSource,
    metric_type: &str,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
) -> String {
    let input = format!(
        "{}:{}:{}:{}",
        source,
        metric_type,
        format_utc_rfc3339(start_time),
        end_time.map(format_utc_rfc3339).unwrap_or_default()
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}
