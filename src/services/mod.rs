// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod dedupe;
pub mod identity;
pub mod normalize;
pub mod processor;
pub mod strava;

pub use identity::IdentityResolver;
pub use processor::{BatchProcessor, BatchSummary};
pub use strava::{ActivityFetch, StravaClient};
