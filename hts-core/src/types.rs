//! Shared data model for the health-check scheduler and load-test engine.
//!
//! These types are the wire/document shapes shared between the scheduler,
//! the load-test engine, the persistence gateway and the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a health-check definition as stored by the portal.
pub const STATUS_ACTIVE: &str = "active";

/// A health-check definition as owned by the external configuration store.
///
/// `name` doubles as the log-collection suffix (`healthcheck_<name>`) and is
/// assumed pre-normalized (lowercase letters and hyphens) by the portal that
/// writes it; this crate does not re-validate that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckDefinition {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Probe interval in whole seconds, 1..=86400.
    pub interval_seconds: u32,
    pub expected_status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub expected_body: Option<String>,
    pub status: String,
}

impl HealthCheckDefinition {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Fields whose change forces a countdown reset on reconciliation.
    pub fn reschedules_on_change(&self, other: &HealthCheckDefinition) -> bool {
        self.url != other.url
            || self.interval_seconds != other.interval_seconds
            || self.method != other.method
            || self.expected_status_code != other.expected_status_code
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// In-memory pairing of a definition with its remaining-seconds countdown.
#[derive(Debug, Clone)]
pub struct SchedulerEntry {
    pub definition: HealthCheckDefinition,
    pub countdown: u32,
}

impl SchedulerEntry {
    pub fn new(definition: HealthCheckDefinition) -> Self {
        let countdown = definition.interval_seconds;
        Self {
            definition,
            countdown,
        }
    }

    /// Decrements the countdown by one tick; returns `true` if the probe is due.
    pub fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown == 0
    }

    pub fn reset(&mut self) {
        self.countdown = self.definition.interval_seconds;
    }
}

/// Append-only record of one probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckLog {
    pub timestamp: DateTime<Utc>,
    /// 0 on transport failure.
    pub status_code: u16,
    pub response_time_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Caller-supplied request to kick off a load test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestRequest {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    pub calls_per_thread: u32,
    pub threads: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status_code: u16,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_expected_status() -> u16 {
    200
}

impl LoadTestRequest {
    pub fn total_calls(&self) -> u32 {
        self.threads * self.calls_per_thread
    }
}

/// Aggregated metrics document produced by one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestResult {
    pub name: String,
    pub url: String,
    pub method: String,
    pub threads: u32,
    pub calls_per_thread: u32,
    pub total_calls: u32,
    pub total_requests: u32,
    pub successful_requests: u32,
    pub failed_requests: u32,
    pub error_count: u32,
    pub total_duration_ms: u64,
    pub requests_per_second: f64,
    pub success_rate: f64,
    pub average_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub median_time_ms: f64,
    pub p95_time_ms: f64,
    pub p99_time_ms: f64,
    pub status_codes: HashMap<String, u32>,
    pub total_bytes_received: u64,
    pub throughput_mbps: f64,
    pub completed_at: DateTime<Utc>,
}

/// One per dispatched load-test request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestLog {
    pub test_name: String,
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Name of the probe-log collection for a given definition name.
pub fn healthcheck_collection(name: &str) -> String {
    format!("healthcheck_{name}")
}

/// Name of the per-request log collection for a given load-test name.
pub fn loadtest_log_collection(name: &str) -> String {
    format!("loadtest_logs_{name}")
}

pub const HEALTHCHECK_DEFINITIONS_COLLECTION: &str = "healthchecks";
pub const LOADTEST_METRICS_COLLECTION: &str = "loadtest_metrics";

#[cfg(test)]
mod tests {
    use super::*;

    fn def(interval: u32) -> HealthCheckDefinition {
        HealthCheckDefinition {
            id: "1".into(),
            name: "api".into(),
            url: "http://example.com".into(),
            method: "GET".into(),
            interval_seconds: interval,
            expected_status_code: 200,
            headers: HashMap::new(),
            expected_body: None,
            status: STATUS_ACTIVE.into(),
        }
    }

    #[test]
    fn scheduler_entry_fires_at_zero() {
        let mut entry = SchedulerEntry::new(def(3));
        assert_eq!(entry.countdown, 3);
        assert!(!entry.tick());
        assert!(!entry.tick());
        assert!(entry.tick());
        entry.reset();
        assert_eq!(entry.countdown, 3);
    }

    #[test]
    fn reschedules_on_interval_change_only() {
        let a = def(5);
        let mut b = def(5);
        assert!(!a.reschedules_on_change(&b));
        b.interval_seconds = 60;
        assert!(a.reschedules_on_change(&b));
    }

    #[test]
    fn total_calls_multiplies() {
        let req = LoadTestRequest {
            name: "t1".into(),
            url: "http://x".into(),
            method: "GET".into(),
            headers: HashMap::new(),
            body: None,
            calls_per_thread: 50,
            threads: 4,
            timeout: 30,
            expected_status_code: 200,
        };
        assert_eq!(req.total_calls(), 200);
    }
}
