// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod connection;
pub mod metric;
pub mod webhook_event;

pub use connection::{Profile, ProviderConnection, ResolvedIdentity};
pub use metric::{HealthMetric, MetricOwner};
pub use webhook_event::{retry_delay, EventSource, EventStatus, WebhookEvent};
