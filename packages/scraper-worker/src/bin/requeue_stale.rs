//! Return abandoned leases to the queue.
//!
//! A worker that dies, or fails to write a terminal state, leaves its job in
//! PROCESSING. This command moves such jobs back to PENDING once their lease
//! is older than `--older-than-secs`. Run it from cron or by hand; the worker
//! itself never does this.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scraper_core::kernel::jobs::{JobStore, PostgresJobStore};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "requeue_stale")]
#[command(about = "Move stale PROCESSING scrape jobs back to PENDING")]
struct Cli {
    /// Queue connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Minimum lease age before a job counts as stale
    #[arg(long, default_value_t = 3600)]
    older_than_secs: u64,

    /// Report what would be requeued without changing anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Serialize)]
struct RequeueReport {
    older_than_secs: u64,
    stale: u64,
    requeued: u64,
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let older_than = Duration::from_secs(cli.older_than_secs);

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = PostgresJobStore::new(pool);

    let stale = store.count_stale(older_than).await?;
    let requeued = if cli.dry_run {
        0
    } else {
        store.requeue_stale(older_than).await?
    };

    let report = RequeueReport {
        older_than_secs: cli.older_than_secs,
        stale,
        requeued,
        dry_run: cli.dry_run,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
