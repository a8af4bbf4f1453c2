//! Job worker service for processing scrape jobs.
//!
//! The `JobWorker` is a long-running loop that:
//! - Leases one job at a time via `JobStore::acquire_next`
//! - Hands it to a `JobHandler` (the scrape pipeline)
//! - Writes exactly one terminal state (completed or failed)
//! - Sleeps when the queue is empty and backs off on queue errors
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► acquire_next (lease via JobStore)
//!     ├─► JobHandler.execute(job)  ──► result key | error
//!     └─► mark_completed / mark_failed via JobStore
//! ```
//!
//! Shutdown is cooperative: cancelling the token stops new acquisitions and
//! interrupts idle sleeps, but a job that is already leased always runs to
//! its terminal write.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use super::job::ScrapeJob;
use super::store::JobStore;
use crate::config::Config;
use crate::kernel::observability::extract_parent_context;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// How long to wait after the queue itself errors
    pub error_backoff: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            worker_id: format!("scraper-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            worker_id: config.worker_id.clone(),
        }
    }
}

/// Handler trait for processing a leased job.
///
/// Returns the result key to record on success. The error's alternate
/// display (`{:#}`) becomes the job's error message.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &ScrapeJob) -> Result<String>;
}

/// What a single poll of the queue did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A job was leased and driven to a terminal write attempt.
    Processed(Uuid),
    /// Nothing was pending.
    Idle,
    /// The queue could not be reached.
    QueueError,
}

/// A worker that processes scrape jobs from the shared queue.
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    config: JobWorkerConfig,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(store: Arc<dyn JobStore>, handler: Arc<dyn JobHandler>) -> Self {
        Self::with_config(store, handler, JobWorkerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            store,
            handler,
            config,
        }
    }

    /// Lease at most one job and process it.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.store.acquire_next().await {
            Ok(Some(job)) => {
                let job_id = job.id;
                self.process_job(job).await;
                PollOutcome::Processed(job_id)
            }
            Ok(None) => PollOutcome::Idle,
            Err(e) => {
                error!(worker_id = %self.config.worker_id, error = %e, "failed to acquire job");
                PollOutcome::QueueError
            }
        }
    }

    /// Process a single leased job inside its own span.
    async fn process_job(&self, job: ScrapeJob) {
        let span = info_span!(
            "scrape_job",
            otel.kind = "consumer",
            job.id = %job.id,
            job.url = %job.url,
            job.owner_id = %job.owner_id,
            job.attempt = job.attempt_count,
        );

        if let Some(parent) = job.trace_context.as_deref().and_then(extract_parent_context) {
            span.set_parent(parent);
        }

        self.drive_to_terminal(&job).instrument(span).await;
    }

    async fn drive_to_terminal(&self, job: &ScrapeJob) {
        let job_id = job.id;
        info!(job_id = %job_id, url = %job.url, attempt = job.attempt_count, "processing job");

        match self.handler.execute(job).await {
            Ok(result_key) => {
                info!(job_id = %job_id, result_key = %result_key, "job completed");
                if let Err(e) = self.store.mark_completed(job_id, &result_key).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as completed");
                }
            }
            Err(e) => {
                let error_message = format!("{:#}", e);
                warn!(job_id = %job_id, error = %error_message, "job failed");
                if let Err(e) = self.store.mark_failed(job_id, &error_message).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                }
            }
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job worker starting"
        );

        loop {
            // Check for shutdown
            if shutdown.is_cancelled() {
                break;
            }

            let pause = match self.poll_once().await {
                PollOutcome::Processed(_) => continue,
                PollOutcome::Idle => self.config.poll_interval,
                PollOutcome::QueueError => self.config.error_backoff,
            };

            debug!(pause_ms = pause.as_millis() as u64, "waiting before next poll");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }
}
