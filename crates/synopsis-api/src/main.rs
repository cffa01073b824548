//! synopsis HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use synopsis_api::{open_storage, router, AppConfig, AppState, SynopsisService};
use synopsis_core::defaults;
use synopsis_inference::OllamaBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // RUST_LOG - standard env filter (default: "synopsis_api=debug,tower_http=debug")
    synopsis_api::init_tracing("synopsis_api=debug,tower_http=debug");

    let config = AppConfig::from_env()?;
    let storage = open_storage(&config).await?;

    let ollama = Arc::new(OllamaBackend::from_env()?);
    if !ollama.health_check().await {
        warn!("Ollama is not reachable; summarize and embed requests will fail until it is");
    }

    let service = SynopsisService::new(
        storage,
        ollama.clone(),
        ollama,
        config.service_options(),
    );

    service.scheduler().fail_interrupted().await?;

    if let Some(retention) = config.job_retention {
        service.scheduler().start_retention_sweep(
            retention,
            Duration::from_secs(defaults::JOB_PURGE_INTERVAL_SECS),
        );
    }

    let scheduler = service.scheduler().clone();
    let app = router(AppState::new(service));

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Jobs still executing are dropped with the runtime.
    if let Err(e) = scheduler.fail_interrupted().await {
        warn!(error = %e, "Failed to settle interrupted jobs");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
