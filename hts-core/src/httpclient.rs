//! Shared HTTP client construction.
//!
//! The scheduler's probe executor and the load-test engine each need a
//! `reqwest::Client` sized for their own worst case; both go through this
//! builder so the pool-sizing policy lives in one place.

use std::time::Duration;

/// `MaxIdleConns=1000` has no direct `reqwest` equivalent (reqwest caps
/// idle connections per host, not globally); recorded here rather than
/// silently dropped.
pub const SPEC_MAX_IDLE_CONNS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub default_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Builds the shared client used by the health-check executor: a 10s
/// per-request timeout and the default connection-pool sizing.
pub fn build_probe_client() -> reqwest::Result<reqwest::Client> {
    let cfg = HttpClientConfig {
        default_timeout: Duration::from_secs(10),
        ..HttpClientConfig::default()
    };
    build_client(&cfg)
}

/// Builds the shared client used by the load-test engine. Per-request
/// timeouts are applied on a per-`RequestBuilder` basis because each
/// load-test request can carry its own `timeout` field; this client
/// only fixes the connection-pool policy.
pub fn build_loadtest_client() -> reqwest::Result<reqwest::Client> {
    build_client(&HttpClientConfig::default())
}

fn build_client(cfg: &HttpClientConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(cfg.default_timeout)
        .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
        .pool_idle_timeout(cfg.pool_idle_timeout)
        .build()
}
