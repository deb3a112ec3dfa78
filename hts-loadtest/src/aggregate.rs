//! Percentile and throughput aggregation.
//!
//! The nearest-rank-with-floor rule is specified for bitwise compatibility
//! with existing summaries and must not be swapped for linear
//! interpolation even though that is the more common convention.

use crate::worker::RequestResult;
use chrono::Utc;
use hts_core::types::{LoadTestRequest, LoadTestResult};
use std::collections::HashMap;
use std::time::Duration;

/// `sorted[floor(len * p / 100)]`, clamped to the last index. `sorted` must
/// already be ascending.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mut index = ((sorted.len() as f64) * p / 100.0).floor() as usize;
    if index >= sorted.len() {
        index = sorted.len() - 1;
    }
    sorted[index]
}

/// Builds the final [`LoadTestResult`] from every request's outcome and the
/// run's wall-clock duration. `results` may be in any order — arrival
/// order is preserved only incidentally and percentiles are computed after
/// an explicit sort.
pub fn aggregate(
    request: &LoadTestRequest,
    results: &[RequestResult],
    total_duration: Duration,
) -> LoadTestResult {
    let total_requests = results.len() as u32;

    let mut successful = 0u32;
    let mut error_count = 0u32;
    let mut total_bytes = 0u64;
    let mut status_codes: HashMap<String, u32> = HashMap::new();
    let mut latencies_ms = Vec::with_capacity(results.len());
    let mut min_time = f64::INFINITY;
    let mut max_time = 0.0f64;
    let mut sum_time = 0.0f64;

    for result in results {
        let latency_ms = result.elapsed.as_millis() as f64;
        latencies_ms.push(latency_ms);
        sum_time += latency_ms;
        if latency_ms < min_time {
            min_time = latency_ms;
        }
        if latency_ms > max_time {
            max_time = latency_ms;
        }
        total_bytes += result.bytes;

        if result.error.is_some() {
            error_count += 1;
        } else {
            *status_codes
                .entry(result.status_code.to_string())
                .or_insert(0) += 1;
        }

        if result.success(request.expected_status_code) {
            successful += 1;
        }
    }

    let failed_requests = total_requests - successful;
    let min_time_ms = if min_time.is_infinite() { 0.0 } else { min_time };

    latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let total_duration_secs = total_duration.as_secs_f64();
    let average_time_ms = if total_requests > 0 {
        sum_time / total_requests as f64
    } else {
        0.0
    };
    let requests_per_second = if total_duration_secs > 0.0 {
        total_requests as f64 / total_duration_secs
    } else {
        0.0
    };
    let success_rate = if total_requests > 0 {
        (successful as f64 / total_requests as f64) * 100.0
    } else {
        0.0
    };
    let throughput_mbps = if total_duration_secs > 0.0 {
        (total_bytes as f64 / 1_048_576.0) / total_duration_secs
    } else {
        0.0
    };

    LoadTestResult {
        name: request.name.clone(),
        url: request.url.clone(),
        method: request.method.clone(),
        threads: request.threads,
        calls_per_thread: request.calls_per_thread,
        total_calls: request.total_calls(),
        total_requests,
        successful_requests: successful,
        failed_requests,
        error_count,
        total_duration_ms: total_duration.as_millis() as u64,
        requests_per_second,
        success_rate,
        average_time_ms,
        min_time_ms,
        max_time_ms: max_time,
        median_time_ms: percentile(&latencies_ms, 50.0),
        p95_time_ms: percentile(&latencies_ms, 95.0),
        p99_time_ms: percentile(&latencies_ms, 99.0),
        status_codes,
        total_bytes_received: total_bytes,
        throughput_mbps,
        completed_at: Utc::now(),
    }
}
