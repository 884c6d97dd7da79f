use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use texforge_orchestrator::config::Config;
use texforge_orchestrator::shutdown::install_shutdown_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "texforge_orchestrator=info,texforge_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TexForge...");

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        "Max concurrent jobs: {}, compilation timeout: {:?}, cleanup delay: {:?}",
        config.max_concurrent_jobs,
        config.compilation_timeout,
        config.cleanup_delay
    );
    if config.queue.enabled {
        tracing::info!(
            "Queue enabled: max size {}, job timeout {:?}",
            config.queue.max_queue_size,
            config.queue.job_timeout
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!("Listening on {}", config.bind_addr);

    let shutdown = install_shutdown_handler();
    texforge_orchestrator::serve(listener, config, shutdown).await
}
