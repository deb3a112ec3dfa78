//! Load-Test Engine — validates a request, drives a bounded worker
//! pool against the target, aggregates results with nearest-rank
//! percentiles, and persists the summary.

mod aggregate;
pub mod error;
mod worker;

pub use error::{Error, Result};
pub use worker::RequestResult;

use hts_core::types::{LoadTestRequest, LoadTestResult, LOADTEST_METRICS_COLLECTION};
use hts_store::PersistenceGateway;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs one load test end to end. Returns an error only for
/// pre-flight validation failures, a duplicate name, zero completed
/// requests, or a failed summary write.
pub async fn execute(
    request: LoadTestRequest,
    client: &reqwest::Client,
    gateway: Arc<dyn PersistenceGateway>,
    cancel: &CancellationToken,
) -> Result<LoadTestResult> {
    validate(&request)?;

    if gateway.name_exists(&request.name, cancel).await? {
        return Err(Error::DuplicateName(request.name.clone()));
    }

    let started = Instant::now();
    let results = worker::dispatch(&request, client, &gateway, cancel).await;
    let total_duration = started.elapsed();

    if results.is_empty() {
        return Err(Error::NoRequestsCompleted);
    }

    let summary = aggregate::aggregate(&request, &results, total_duration);

    let doc = mongodb::bson::to_document(&summary).map_err(hts_store::Error::from)?;
    gateway
        .insert_metrics(LOADTEST_METRICS_COLLECTION, doc, cancel)
        .await?;

    Ok(summary)
}

fn validate(request: &LoadTestRequest) -> Result<()> {
    if request.name.trim().is_empty() {
        return Err(Error::Validation("name must not be empty".into()));
    }
    if request.calls_per_thread < 1 {
        return Err(Error::Validation("callsPerThread must be >= 1".into()));
    }
    if request.threads < 1 {
        return Err(Error::Validation("threads must be >= 1".into()));
    }
    Ok(())
}
