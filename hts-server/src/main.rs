//! Site-Reliability toolkit server
//!
//! Bootstraps the document-store connection, the health-check scheduler,
//! and the control plane, then serves until an interrupt/termination
//! signal triggers graceful shutdown.

use hts_server::{AppState, create_router};
use hts_store::{MongoGateway, PersistenceGateway, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LISTEN_PORT: u16 = 8080;
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hts_server=info,hts_scheduler=info,hts_loadtest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting SRE toolkit server");

    let store_config = StoreConfig::from_env();
    tracing::info!(database = %store_config.mongo_database, "connecting to document store");
    let gateway = MongoGateway::connect(&store_config).await?;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway);

    let root_cancel = CancellationToken::new();

    let probe_client = hts_core::httpclient::build_probe_client()?;
    let scheduler = Arc::new(hts_scheduler::Scheduler::new(
        Arc::clone(&gateway),
        probe_client,
    ));
    scheduler.load_initial(&root_cancel).await;

    let ticker = Arc::new(hts_scheduler::TickSource::new());
    let ticks = ticker.subscribe().await;
    ticker.start(root_cancel.clone()).await;
    scheduler.start(ticks, root_cancel.clone()).await;
    tracing::info!("health-check scheduler started");

    let loadtest_client = hts_core::httpclient::build_loadtest_client()?;
    let state = AppState {
        gateway: Arc::clone(&gateway),
        http_client: loadtest_client,
        cancel: root_cancel.clone(),
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = format!("0.0.0.0:{LISTEN_PORT}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(root_cancel.clone()))
        .await?;

    // Grant in-flight handlers/background tasks a drain window before
    // tearing down the scheduler.
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    scheduler.stop().await;
    ticker.stop().await;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Waits for SIGINT or SIGTERM, then fires the root cancellation token so
/// every long-lived task (ticker, scheduler, in-flight store calls) can
/// unwind cleanly.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }

    tracing::info!("shutdown signal received, draining");
    cancel.cancel();
}
