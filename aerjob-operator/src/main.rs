use std::sync::Arc;

use aerjob_operator::api::{self, AppState};
use aerjob_operator::builder::WorkerSpecBuilder;
use aerjob_operator::config::{Config, WorkerRuntime};
use aerjob_operator::controller::Controller;
use aerjob_operator::db;
use aerjob_operator::reconciler::Reconciler;
use aerjob_operator::runtime::{PodmanClient, WorkerLauncher};
use aerjob_operator::store::{MemoryStore, ObjectStore, PgStore};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aerjob_operator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting aerjob operator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let store: Arc<dyn ObjectStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(url)
                .await
                .context("Failed to create database pool")?;

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Using Postgres object store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory object store");
            Arc::new(MemoryStore::new())
        }
    };

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        WorkerSpecBuilder::new(config.worker_env.clone()),
        config.requeue_policy(),
    ));

    let (controller, trigger) = Controller::new(
        reconciler,
        Arc::clone(&store),
        config.resync_interval,
        config.max_concurrent_reconciles,
    );
    tokio::spawn(controller.run());

    if config.worker_runtime == WorkerRuntime::Podman {
        let launcher = WorkerLauncher::new(
            Arc::clone(&store),
            PodmanClient::default(),
            trigger.clone(),
            config.runtime_poll_interval,
        );
        tokio::spawn(async move {
            if let Err(e) = launcher.run().await {
                tracing::error!("Worker launcher stopped: {:#}", e);
            }
        });
    }

    // Build router with all API endpoints
    let app = api::create_router(AppState { store, trigger });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
