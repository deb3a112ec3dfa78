//! Per-request dispatch and the bounded worker pool.
//!
//! A shared client and a fixed-size worker pool keep concurrency bounded
//! regardless of how many requests a run dispatches. A failed attempt is
//! counted, never retried — this engine does not adapt its rate or retry
//! on failure.

use hts_core::types::{LoadTestLog, LoadTestRequest, loadtest_log_collection};
use hts_store::PersistenceGateway;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outcome of one dispatched request, produced by a worker and consumed by
/// the aggregator. `status_code == 0` marks a transport failure.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub status_code: u16,
    pub elapsed: Duration,
    pub bytes: u64,
    pub error: Option<String>,
}

impl RequestResult {
    /// Success criterion for one request: transport succeeded and
    /// the observed status matches what the run expected.
    pub(crate) fn success(&self, expected_status_code: u16) -> bool {
        self.error.is_none() && self.status_code == expected_status_code
    }
}

/// Runs the producer/worker/collector trio for one load test and returns
/// every `RequestResult` in completion order. The job channel
/// carries `total_calls` tokens; `threads` workers consume it concurrently.
pub async fn dispatch(
    request: &LoadTestRequest,
    client: &reqwest::Client,
    gateway: &Arc<dyn PersistenceGateway>,
    cancel: &CancellationToken,
) -> Vec<RequestResult> {
    let total_calls = request.total_calls() as usize;
    let (job_tx, job_rx) = mpsc::channel::<()>(request.threads.max(1) as usize);
    let (result_tx, mut result_rx) = mpsc::channel::<RequestResult>(total_calls.max(1));
    let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

    let producer_cancel = cancel.clone();
    let producer = tokio::spawn(async move {
        for _ in 0..total_calls {
            tokio::select! {
                _ = producer_cancel.cancelled() => break,
                send = job_tx.send(()) => {
                    if send.is_err() {
                        break;
                    }
                }
            }
        }
        // Dropping job_tx closes the channel, letting workers drain and exit.
    });

    let mut workers = Vec::with_capacity(request.threads as usize);
    for _ in 0..request.threads.max(1) {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let client = client.clone();
        let request = request.clone();
        let gateway = Arc::clone(gateway);
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let token = job_rx.lock().await.recv().await;
                if token.is_none() {
                    break;
                }
                let result = execute_one(&request, &client).await;
                persist_log(&request, &result, &gateway, &cancel).await;
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let _ = producer.await;
    for worker in workers {
        let _ = worker.await;
    }

    let mut results = Vec::with_capacity(total_calls);
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }
    results
}

/// Issues one HTTP request per the run's configuration, fully draining the
/// body to count bytes received. Transport errors (DNS, connect,
/// TLS, I/O, timeout) are captured as-is, never retried.
async fn execute_one(request: &LoadTestRequest, client: &reqwest::Client) -> RequestResult {
    let started = Instant::now();

    let method = request
        .method
        .parse()
        .unwrap_or(reqwest::Method::GET);
    let mut builder = client
        .request(method, &request.url)
        .timeout(Duration::from_secs(request.timeout));
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    match builder.send().await {
        Err(err) => RequestResult {
            status_code: 0,
            elapsed: started.elapsed(),
            bytes: 0,
            error: Some(err.to_string()),
        },
        Ok(response) => {
            let status_code = response.status().as_u16();
            match response.bytes().await {
                Ok(body) => RequestResult {
                    status_code,
                    elapsed: started.elapsed(),
                    bytes: body.len() as u64,
                    error: None,
                },
                Err(err) => RequestResult {
                    status_code,
                    elapsed: started.elapsed(),
                    bytes: 0,
                    error: Some(err.to_string()),
                },
            }
        }
    }
}

/// Synchronously persists one per-request log before the result is handed
/// to the aggregator. Failures are swallowed — one bad log write
/// must not abort the run.
async fn persist_log(
    request: &LoadTestRequest,
    result: &RequestResult,
    gateway: &Arc<dyn PersistenceGateway>,
    cancel: &CancellationToken,
) {
    let log = LoadTestLog {
        test_name: request.name.clone(),
        url: request.url.clone(),
        method: request.method.clone(),
        status_code: result.status_code,
        latency_ms: result.elapsed.as_millis() as u64,
        success: result.success(request.expected_status_code),
        error: result.error.clone(),
    };
    let doc = match mongodb::bson::to_document(&log) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::error!(test = %request.name, error = %err, "failed to encode load-test log");
            return;
        }
    };
    let collection = loadtest_log_collection(&request.name);
    if let Err(err) = gateway.insert_log(&collection, doc, cancel).await {
        tracing::error!(test = %request.name, error = %err, "failed to persist load-test log");
    }
}
