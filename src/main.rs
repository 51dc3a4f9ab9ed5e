//! Main entry point for the generation job queue

use std::sync::Arc;

use gen_job_queue::{
    api,
    config::{LoggingConfig, Settings},
    engine::{EngineAdapter, HttpEngine, Sampler},
    store::{JobStore, SqliteJobStore},
    AppState,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    init_logging(&settings.logging);

    info!("Starting generation job queue");
    info!(
        "Loaded configuration: server={}:{}",
        settings.server.host, settings.server.port
    );

    let store = Arc::new(SqliteJobStore::connect(&settings.database).await?);

    // Jobs whose queue entry died with a previous process are not re-queued
    let stranded = store.count_pending().await?;
    if stranded > 0 {
        warn!(count = stranded, "Jobs left pending by a previous run will not be processed");
    }

    // The blocking HTTP client must be built off the async executor
    let engine_config = settings.engine.clone();
    let engine = tokio::task::spawn_blocking(move || HttpEngine::new(&engine_config)).await??;
    info!(url = %engine.generate_url(), "Engine configured");

    let fallback = Sampler::lookup(&settings.engine.default_sampler).unwrap_or_else(|| {
        warn!(sampler = %settings.engine.default_sampler, "Unknown default sampler, using Euler a");
        Sampler::DEFAULT
    });
    let adapter = EngineAdapter::with_fallback(engine, fallback);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let (state, worker) = AppState::start(settings, store, adapter).await?;

    // Build the router
    let app = api::routes::create_router(state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
