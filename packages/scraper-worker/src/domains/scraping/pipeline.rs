//! Scrape pipeline state machine.
//!
//! ```text
//! LEASED → FETCHING → NORMALIZING → [ANALYZING] → STORING → DONE
//!              └───────────────┴──────────────────────┴──→ ERRORED
//! ```
//!
//! Steps run strictly in order for one job. Fetch and store failures end the
//! attempt in `Errored`; normalization is total and analysis never fails, so
//! neither can. Nothing is reported as done until every artifact is written.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use super::models::JobAnalysis;
use super::storage_key::{artifact_key, ArtifactKind};
use crate::common::utils::content::{normalize_with, NormalizerConfig};
use crate::config::Config;
use crate::kernel::jobs::{JobHandler, ScrapeJob};
use crate::kernel::WorkerDeps;

/// Externally visible pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Leased,
    Fetching,
    Normalizing,
    Analyzing,
    Storing,
    Done,
    Errored,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leased => "leased",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Analyzing => "analyzing",
            Self::Storing => "storing",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Fetcher error text, unchanged.
    #[error("{0}")]
    Fetch(String),

    #[error("failed to store {key}: {message}")]
    Store { key: String, message: String },

    #[error("{step} step timed out after {}s", .after.as_secs_f64())]
    Timeout { step: PipelineState, after: Duration },
}

/// Record of one attempt: the states visited and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub transitions: Vec<PipelineState>,
    /// Result key on success.
    pub outcome: Result<String, PipelineError>,
}

impl PipelineRun {
    pub fn final_state(&self) -> PipelineState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(PipelineState::Leased)
    }
}

/// Internal step carrying the data produced so far.
enum Step {
    Fetching,
    Normalizing { raw: String },
    Analyzing { text: String },
    Storing { text: String, analysis: Option<JobAnalysis> },
    Done { result_key: String },
    Errored { error: PipelineError },
}

impl Step {
    fn state(&self) -> PipelineState {
        match self {
            Self::Fetching => PipelineState::Fetching,
            Self::Normalizing { .. } => PipelineState::Normalizing,
            Self::Analyzing { .. } => PipelineState::Analyzing,
            Self::Storing { .. } => PipelineState::Storing,
            Self::Done { .. } => PipelineState::Done,
            Self::Errored { .. } => PipelineState::Errored,
        }
    }
}

/// Drives one leased job through fetch, normalize, analyze, and store.
#[derive(Clone)]
pub struct ScrapePipeline {
    deps: WorkerDeps,
    normalizer: NormalizerConfig,
    step_timeout: Option<Duration>,
}

impl ScrapePipeline {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            normalizer: NormalizerConfig::default(),
            step_timeout: None,
        }
    }

    pub fn from_config(deps: WorkerDeps, config: &Config) -> Self {
        Self::new(deps)
            .with_normalizer(NormalizerConfig::with_max_ngram(config.ngram_max))
            .with_step_timeout(config.step_timeout)
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Bound each I/O step (fetch, analyze, store). `None` waits indefinitely.
    pub fn with_step_timeout(mut self, step_timeout: Option<Duration>) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Run one attempt to a terminal state.
    pub async fn run(&self, job: &ScrapeJob) -> PipelineRun {
        let mut transitions = vec![PipelineState::Leased];
        let mut step = Step::Fetching;

        loop {
            transitions.push(step.state());
            step = match step {
                Step::Done { result_key } => {
                    return PipelineRun {
                        transitions,
                        outcome: Ok(result_key),
                    }
                }
                Step::Errored { error } => {
                    return PipelineRun {
                        transitions,
                        outcome: Err(error),
                    }
                }
                active => self.advance(job, active).await,
            };
        }
    }

    async fn advance(&self, job: &ScrapeJob, step: Step) -> Step {
        match step {
            Step::Fetching => match self.fetch(job).await {
                Ok(raw) => Step::Normalizing { raw },
                Err(error) => Step::Errored { error },
            },
            Step::Normalizing { raw } => {
                let text = info_span!("normalize", bytes = raw.len())
                    .in_scope(|| normalize_with(&raw, &self.normalizer));
                debug!(job_id = %job.id, raw_bytes = raw.len(), text_bytes = text.len(), "normalized page");

                if self.deps.analyzer.is_some() {
                    Step::Analyzing { text }
                } else {
                    Step::Storing {
                        text,
                        analysis: None,
                    }
                }
            }
            Step::Analyzing { text } => {
                let analysis = self.analyze(job, &text).await;
                Step::Storing {
                    text,
                    analysis: Some(analysis),
                }
            }
            Step::Storing { text, analysis } => match self.store(job, text, analysis).await {
                Ok(result_key) => Step::Done { result_key },
                Err(error) => Step::Errored { error },
            },
            terminal => terminal,
        }
    }

    async fn fetch(&self, job: &ScrapeJob) -> Result<String, PipelineError> {
        let fetched = self
            .within(
                PipelineState::Fetching,
                self.deps.page_fetcher.fetch(&job.url),
            )
            .instrument(info_span!("fetch_page", url = %job.url))
            .await?;

        fetched.map_err(|e| PipelineError::Fetch(format!("{:#}", e)))
    }

    async fn analyze(&self, job: &ScrapeJob, text: &str) -> JobAnalysis {
        let Some(analyzer) = &self.deps.analyzer else {
            return JobAnalysis::default();
        };

        let analyzed = self
            .within(PipelineState::Analyzing, analyzer.analyze(text))
            .instrument(info_span!("analyze", text_bytes = text.len()))
            .await;

        match analyzed {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "analysis abandoned, using empty record");
                JobAnalysis::default()
            }
        }
    }

    /// Write the analysis (when present) and then the content artifact.
    async fn store(
        &self,
        job: &ScrapeJob,
        text: String,
        analysis: Option<JobAnalysis>,
    ) -> Result<String, PipelineError> {
        if let Some(analysis) = analysis {
            let key = artifact_key(job.owner_id, job.position_id, ArtifactKind::Analysis);
            let body = serde_json::to_vec(&analysis).map_err(|e| PipelineError::Store {
                key: key.clone(),
                message: e.to_string(),
            })?;
            self.put(&key, Bytes::from(body), ArtifactKind::Analysis)
                .await?;
        }

        let key = artifact_key(job.owner_id, job.position_id, ArtifactKind::Content);
        self.put(&key, Bytes::from(text), ArtifactKind::Content)
            .await?;
        Ok(key)
    }

    async fn put(&self, key: &str, body: Bytes, kind: ArtifactKind) -> Result<(), PipelineError> {
        let written = self
            .within(
                PipelineState::Storing,
                self.deps.blob_store.put(key, body, kind.content_type()),
            )
            .instrument(info_span!("store_artifact", key = %key))
            .await?;

        written.map_err(|e| PipelineError::Store {
            key: key.to_string(),
            message: format!("{:#}", e),
        })
    }

    async fn within<F>(&self, step: PipelineState, future: F) -> Result<F::Output, PipelineError>
    where
        F: Future,
    {
        match self.step_timeout {
            Some(after) => tokio::time::timeout(after, future)
                .await
                .map_err(|_| PipelineError::Timeout { step, after }),
            None => Ok(future.await),
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for ScrapePipeline {
    async fn execute(&self, job: &ScrapeJob) -> anyhow::Result<String> {
        let run = self.run(job).await;
        debug!(
            job_id = %job.id,
            transitions = ?run.transitions,
            "pipeline finished"
        );
        run.outcome.map_err(anyhow::Error::from)
    }
}
