//! Control Plane — the HTTP surface in front of the load-test
//! engine and the scheduler's persisted state.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use hts_core::types::LoadTestRequest;
use hts_store::PersistenceGateway;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub http_client: reqwest::Client,
    pub cancel: CancellationToken,
}

/// Control-plane error types, rendered by [`IntoResponse`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    Decode(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("a test named {0:?} already exists")]
    DuplicateName(String),

    #[error("store error: {0}")]
    Store(#[from] hts_store::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Decode(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::MissingField(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::DuplicateName(_) => (StatusCode::CONFLICT, "duplicate_name"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };
        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestKickoffConfig {
    pub threads: u32,
    pub calls_per_thread: u32,
    pub total_calls: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestKickoffResponse {
    pub status: String,
    pub message: String,
    pub name: String,
    pub config: LoadTestKickoffConfig,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub time: chrono::DateTime<Utc>,
}

/// `GET /health` — liveness only, no dependency checks.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        time: Utc::now(),
    })
}

/// `POST /loadtest`: decode, validate required fields, reject
/// duplicates, then spawn the run on a detached task and respond
/// immediately. The spawned task's lifetime is tied to the process, not
/// to this handler, so the client sees 200 long before the run completes.
pub async fn loadtest_handler(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<LoadTestKickoffResponse>, ApiError> {
    let request: LoadTestRequest =
        serde_json::from_slice(&body).map_err(|err| ApiError::Decode(err.to_string()))?;

    if request.name.trim().is_empty() {
        return Err(ApiError::MissingField("name"));
    }
    if request.url.trim().is_empty() {
        return Err(ApiError::MissingField("url"));
    }

    if state
        .gateway
        .name_exists(&request.name, &state.cancel)
        .await?
    {
        return Err(ApiError::DuplicateName(request.name));
    }

    let config = LoadTestKickoffConfig {
        threads: request.threads,
        calls_per_thread: request.calls_per_thread,
        total_calls: request.total_calls(),
    };
    let name = request.name.clone();

    let client = state.http_client.clone();
    let gateway = Arc::clone(&state.gateway);
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = hts_loadtest::execute(request, &client, gateway, &cancel).await {
            tracing::error!(test = %name, error = %err, "load test run failed");
        }
    });

    Ok(Json(LoadTestKickoffResponse {
        status: "started".to_string(),
        message: "load test started".to_string(),
        name,
        config,
    }))
}

/// Builds the router with all control-plane routes. Panic recovery and
/// request-line tracing are layered on by the caller (see `main.rs`), not
/// here, so this function stays testable with a bare `AppState`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/loadtest", post(loadtest_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
