use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use querygpt_backend::api::{self, handlers::AppState};
use querygpt_backend::config::Config;
use querygpt_backend::services::database::create_introspector;
use querygpt_backend::services::{HttpGenerativeBackend, PipelineSettings, QueryPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (.env first, then environment)
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(config.logging.style != "never")
        .init();

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let introspector = create_introspector(&config).await?;
    let llm = Arc::new(HttpGenerativeBackend::new(&config.llm));
    let settings = PipelineSettings::from_config(&config);
    info!(
        "Pipeline ready: {} backend, {:?} translation, row cap {}",
        introspector.dialect().display_name(),
        settings.strategy,
        settings.row_cap
    );
    let pipeline = Arc::new(QueryPipeline::new(introspector, llm, settings));

    // Warm the schema context so the first question does not pay for it
    let warmup = pipeline.clone();
    tokio::spawn(async move {
        match warmup.schema_context().await {
            Ok(context) => info!("Schema context ready: {} tables", context.snapshot.len()),
            Err(e) => error!("Schema warm-up failed, will retry on first request: {}", e),
        }
    });

    let app: Router = api::create_router(AppState { pipeline });

    // Start server
    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_address()))?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
