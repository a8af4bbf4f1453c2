// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The scrape pipeline (domains/scraping) is written against these traits so
// every collaborator can be swapped for a test double.
//
// Naming convention: Base* for trait names (e.g., BasePageFetcher, BaseAnalyzer)

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::domains::scraping::models::JobAnalysis;

// =============================================================================
// Page Fetcher Trait (Infrastructure - raw page download)
// =============================================================================

#[async_trait]
pub trait BasePageFetcher: Send + Sync {
    /// Download the raw markup at `url`.
    ///
    /// A non-success response is an error; its message is shown to operators
    /// as the job's failure reason.
    async fn fetch(&self, url: &str) -> Result<String>;
}

// =============================================================================
// Analyzer Trait (Infrastructure - structured extraction)
// =============================================================================

#[async_trait]
pub trait BaseAnalyzer: Send + Sync {
    /// Extract a structured record from normalized text.
    ///
    /// Never fails: implementations return `JobAnalysis::default()` when the
    /// backend is unavailable or answers with something unusable.
    async fn analyze(&self, text: &str) -> JobAnalysis;
}

// =============================================================================
// Blob Store Trait (Infrastructure - artifact persistence)
// =============================================================================

#[async_trait]
pub trait BaseBlobStore: Send + Sync {
    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;
}
