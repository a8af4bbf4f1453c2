//! Worker dependencies for the scrape pipeline (using traits for testability)
//!
//! This module provides the dependency container handed to the pipeline.
//! All external services use trait abstractions to enable testing.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{AnalyzerConfig, Config};
use crate::kernel::{
    ai::{FakeAnalyzer, OpenAiAnalyzer},
    blob_store::ObjectBlobStore,
    http_fetcher::HttpPageFetcher,
    BaseAnalyzer, BaseBlobStore, BasePageFetcher,
};

/// Collaborators used by the pipeline.
#[derive(Clone)]
pub struct WorkerDeps {
    pub page_fetcher: Arc<dyn BasePageFetcher>,
    /// `None` skips the analysis step entirely.
    pub analyzer: Option<Arc<dyn BaseAnalyzer>>,
    pub blob_store: Arc<dyn BaseBlobStore>,
}

impl WorkerDeps {
    pub fn new(
        page_fetcher: Arc<dyn BasePageFetcher>,
        analyzer: Option<Arc<dyn BaseAnalyzer>>,
        blob_store: Arc<dyn BaseBlobStore>,
    ) -> Self {
        Self {
            page_fetcher,
            analyzer,
            blob_store,
        }
    }

    /// Build the production collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let page_fetcher = Arc::new(HttpPageFetcher::new(config.fetch_timeout)?);

        let blob_store = ObjectBlobStore::from_config(&config.storage)?;
        info!(backend = blob_store.backend(), "blob store ready");

        let analyzer: Option<Arc<dyn BaseAnalyzer>> = match &config.analyzer {
            AnalyzerConfig::Disabled => None,
            AnalyzerConfig::Fake => Some(Arc::new(FakeAnalyzer)),
            AnalyzerConfig::OpenAi {
                api_key,
                base_url,
                model,
            } => Some(Arc::new(
                OpenAiAnalyzer::new(api_key, model).with_base_url(base_url),
            )),
        };
        info!(
            analyzer = match &config.analyzer {
                AnalyzerConfig::Disabled => "disabled",
                AnalyzerConfig::Fake => "fake",
                AnalyzerConfig::OpenAi { .. } => "openai",
            },
            "analyzer ready"
        );

        Ok(Self::new(page_fetcher, analyzer, Arc::new(blob_store)))
    }
}
