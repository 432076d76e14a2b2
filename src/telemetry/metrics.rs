// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lightweight runtime metrics.
//!
//! Counts and timings for agent turns, tool dispatches, checkpoint store
//! operations, and token usage. No external collector; callers read a
//! snapshot when they want a report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Tool dispatch metrics by tool name.
    tools: RwLock<HashMap<String, ToolMetrics>>,
    /// Timed operations by name (agent turns, store reads/writes).
    operations: RwLock<HashMap<String, OperationMetrics>>,
    tokens: TokenMetrics,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            tokens: TokenMetrics::new(),
            start_time: Instant::now(),
        }
    }

    /// Record one tool dispatch.
    pub fn record_tool(&self, name: &str, duration: Duration, success: bool) {
        let mut tools = self.tools.write().unwrap();
        tools
            .entry(name.to_string())
            .or_default()
            .record(duration, success);
    }

    /// Record one timed operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        let mut ops = self.operations.write().unwrap();
        ops.entry(name.to_string()).or_default().record(duration);
    }

    /// Record model token usage.
    pub fn record_tokens(&self, input: u64, output: u64) {
        self.tokens.add(input, output);
    }

    pub fn tool_metrics(&self, name: &str) -> Option<ToolMetrics> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations.read().unwrap().get(name).cloned()
    }

    /// Total (input, output) token counts.
    pub fn token_counts(&self) -> (u64, u64) {
        (
            self.tokens.input.load(Ordering::Relaxed),
            self.tokens.output.load(Ordering::Relaxed),
        )
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (input_tokens, output_tokens) = self.token_counts();
        MetricsSnapshot {
            tools: self.tools.read().unwrap().clone(),
            operations: self.operations.read().unwrap().clone(),
            input_tokens,
            output_tokens,
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.tools.write().unwrap().clear();
        self.operations.write().unwrap().clear();
        self.tokens.reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tool dispatch statistics.
#[derive(Debug, Clone)]
pub struct ToolMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl ToolMetrics {
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.invocations as u32
        }
    }

    /// Success rate, 0.0 to 1.0. Empty metrics count as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }
}

/// Count and latency stats for a named operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl OperationMetrics {
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct TokenMetrics {
    input: AtomicU64,
    output: AtomicU64,
}

impl TokenMetrics {
    fn new() -> Self {
        Self {
            input: AtomicU64::new(0),
            output: AtomicU64::new(0),
        }
    }

    fn add(&self, input: u64, output: u64) {
        self.input.fetch_add(input, Ordering::Relaxed);
        self.output.fetch_add(output, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.input.store(0, Ordering::Relaxed);
        self.output.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tools: HashMap<String, ToolMetrics>,
    pub operations: HashMap<String, OperationMetrics>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Tokens: {} input, {} output\n\n",
            self.input_tokens, self.output_tokens
        ));

        if !self.tools.is_empty() {
            report.push_str("Tools:\n");
            for (name, metrics) in &self.tools {
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, avg {:.2?}\n",
                    name,
                    metrics.invocations,
                    metrics.success_rate() * 100.0,
                    metrics.avg_duration()
                ));
            }
            report.push('\n');
        }

        if !self.operations.is_empty() {
            report.push_str("Operations:\n");
            for (name, metrics) in &self.operations {
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, max {:.2?}\n",
                    name,
                    metrics.count,
                    metrics.avg_duration(),
                    metrics.max_duration
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_metrics() {
        let mut metrics = ToolMetrics::default();
        metrics.record(Duration::from_millis(100), true);
        metrics.record(Duration::from_millis(200), true);
        metrics.record(Duration::from_millis(50), false);

        assert_eq!(metrics.invocations, 3);
        assert_eq!(metrics.successes, 2);
        assert_eq!(metrics.failures, 1);
        assert!((metrics.success_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_operation_metrics() {
        let mut metrics = OperationMetrics::default();
        metrics.record(Duration::from_millis(10));
        metrics.record(Duration::from_millis(20));
        metrics.record(Duration::from_millis(30));

        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.avg_duration(), Duration::from_millis(20));
        assert_eq!(metrics.max_duration, Duration::from_millis(30));
    }

    #[test]
    fn test_snapshot_and_report() {
        let metrics = Metrics::new();
        metrics.record_tool("getWeather", Duration::from_millis(100), true);
        metrics.record_operation("agent.turn", Duration::from_millis(400));
        metrics.record_tokens(1000, 500);

        let snapshot = metrics.snapshot();
        assert!(snapshot.tools.contains_key("getWeather"));
        assert!(snapshot.operations.contains_key("agent.turn"));
        assert_eq!(snapshot.input_tokens, 1000);
        assert_eq!(snapshot.output_tokens, 500);

        let report = snapshot.format_report();
        assert!(report.contains("getWeather"));
        assert!(report.contains("agent.turn"));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();
        metrics.record_tool("t", Duration::from_millis(100), true);
        metrics.record_tokens(100, 50);

        metrics.reset();

        assert!(metrics.tool_metrics("t").is_none());
        assert_eq!(metrics.token_counts(), (0, 0));
    }
}
