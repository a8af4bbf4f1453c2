//! Scraper worker process.
//!
//! Polls `scraper_queue` until SIGINT/SIGTERM. Run several copies against the
//! same database to scale out; the lease protocol keeps them from colliding.

use std::sync::Arc;

use anyhow::{Context, Result};
use scraper_core::domains::scraping::ScrapePipeline;
use scraper_core::kernel::jobs::{JobWorker, JobWorkerConfig, PostgresJobStore};
use scraper_core::kernel::observability::init_observability;
use scraper_core::kernel::WorkerDeps;
use scraper_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    let _observability = init_observability(&config.observability);

    info!(worker_id = %config.worker_id, "Starting scraper worker");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Migrations applied");
    }

    let deps = WorkerDeps::from_config(&config)?;
    let pipeline = ScrapePipeline::from_config(deps, &config);
    let worker = JobWorker::with_config(
        Arc::new(PostgresJobStore::new(pool.clone())),
        Arc::new(pipeline),
        JobWorkerConfig::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    worker.run(shutdown).await?;

    pool.close().await;
    info!("Scraper worker exited");
    Ok(())
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal, finishing current job");
    shutdown.cancel();
}
