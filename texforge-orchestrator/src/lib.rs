//! TexForge Orchestrator
//!
//! The document compile service: admission, dispatch, retention and the
//! HTTP API around the runner's compile engine.
//!
//! Two front doors share one compile service:
//! - `POST /compile` holds the request open and answers with the result,
//!   bounded by the job registry's concurrency ceiling
//! - `POST /jobs` (when the queue is enabled) persists the upload and
//!   returns at once; a single worker drains the queue

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod queue;
pub mod registry;
pub mod retention;
pub mod shutdown;
pub mod state;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::{Config, QueueConfig};
use dispatcher::Dispatcher;
use queue::{MemoryStore, QueueFrontDoor, QueueWorker, RedisStore, SharedStore};
use registry::JobRegistry;
use retention::{CleanupScheduler, Sweeper};
use state::AppState;
use texforge_runner::{CompileService, Pipeline, StandardCompileService};

/// Handler state plus the background tasks that go with it
pub struct Services {
    pub state: AppState,
    pub worker: Option<QueueWorker>,
    pub sweeper: Option<Sweeper>,
}

/// Opens the shared store behind the queue front door
///
/// A configured Redis URL selects [`RedisStore`], so several processes can
/// share one queue; otherwise the store lives in this process.
pub async fn open_store(config: &QueueConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    match config.store_url.as_deref().filter(|_| config.enabled) {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .context("Failed to connect to the shared store")?;
            tracing::info!("Using Redis shared store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Wires every component from `config`
///
/// `store` backs the queue front door and is unused when the queue is
/// disabled. Background tasks are returned unstarted; deferred cleanups stop
/// when `shutdown` fires.
pub fn build_services(
    config: Config,
    store: Arc<dyn SharedStore>,
    shutdown: &CancellationToken,
) -> Services {
    let layout = config.layout();
    let service: Arc<dyn CompileService> = Arc::new(StandardCompileService::new(
        Pipeline::new(config.runner()),
        layout.clone(),
    ));

    let registry = Arc::new(JobRegistry::new(
        config.max_concurrent_jobs,
        config.compilation_timeout,
    ));
    let cleanup = CleanupScheduler::new(layout.clone(), config.cleanup_delay, shutdown.clone());
    let dispatcher = Dispatcher::new(registry, service.clone(), cleanup);

    let (queue, worker, sweeper) = if config.queue.enabled {
        let front_door = QueueFrontDoor::new(
            store.clone(),
            layout.clone(),
            config.upload_dir.clone(),
            config.queue.clone(),
        );
        let worker = QueueWorker::new(
            store.clone(),
            service,
            config.upload_dir.clone(),
            config.queue.clone(),
        );
        let sweeper = Sweeper::new(
            store,
            layout.clone(),
            config.upload_dir.clone(),
            config.queue.sweep_interval,
        );
        (Some(front_door), Some(worker), Some(sweeper))
    } else {
        (None, None, None)
    };

    Services {
        state: AppState {
            config: Arc::new(config),
            dispatcher,
            layout,
            queue,
        },
        worker,
        sweeper,
    }
}

/// Serves the API on `listener` until `shutdown` fires
///
/// # Arguments
/// * `listener` - Bound listener, so callers choose the port
/// * `config` - Validated configuration
/// * `shutdown` - Stops the server and every background task
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    config
        .layout()
        .ensure_dirs()
        .context("Failed to create output directories")?;
    if config.queue.enabled {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .context("Failed to create upload directory")?;
    }

    // Timers of a previous run died with it
    CleanupScheduler::new(config.layout(), config.cleanup_delay, shutdown.clone())
        .reclaim(config.output_retention())
        .await
        .context("Failed to reclaim the output area")?;

    let store = open_store(&config.queue).await?;
    let Services {
        state,
        worker,
        sweeper,
    } = build_services(config, store, &shutdown);

    let mut background = Vec::new();
    if let Some(worker) = worker {
        background.push(tokio::spawn(worker.run(shutdown.clone())));
    }
    if let Some(sweeper) = sweeper {
        background.push(tokio::spawn(sweeper.run(shutdown.clone())));
    }

    let app = api::create_router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("Server error");

    // The server may also stop on its own error
    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!("Background task failed: {}", e);
        }
    }

    tracing::info!("Server stopped");
    result
}
