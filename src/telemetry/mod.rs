// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: structured logging with spans around agent turns and
//!   tool dispatches.
//! - **Metrics**: counters and timings for turns, tools, checkpoint store
//!   operations, and token usage.
//!
//! Most call sites are gated behind the `telemetry` feature; without it the
//! runtime carries no instrumentation overhead.
//!
//! Initialize at application startup:
//!
//! ```rust,ignore
//! use troupe::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Metrics, MetricsSnapshot, OperationMetrics, ToolMetrics, GLOBAL_METRICS};
