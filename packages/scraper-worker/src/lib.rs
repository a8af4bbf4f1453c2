// Scraper Worker - Core
//
// Queue-driven worker that leases scrape jobs from Postgres, fetches the page,
// normalizes it into deduplicated text, optionally analyzes it, and stores the
// artifacts in object storage.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
