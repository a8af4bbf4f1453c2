//! Scrape job queue: model, lease protocol, and polling worker.

pub mod job;
pub mod store;
pub mod worker;

pub use job::{ScrapeJob, ScrapeJobStatus};
pub use store::{JobStore, PostgresJobStore};
pub use worker::{JobHandler, JobWorker, JobWorkerConfig, PollOutcome};
