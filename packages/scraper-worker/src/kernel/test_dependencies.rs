// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into WorkerDeps and
// JobWorker for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::jobs::{JobHandler, JobStore, ScrapeJob, ScrapeJobStatus};
use super::{BaseAnalyzer, BaseBlobStore, BasePageFetcher, WorkerDeps};
use crate::domains::scraping::models::JobAnalysis;

// =============================================================================
// Mock Page Fetcher
// =============================================================================

/// Returns queued responses in order; falls back to an empty page.
pub struct MockPageFetcher {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, html: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(html.to_string()));
        self
    }

    /// Queue a failure whose message is returned verbatim.
    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    /// URLs requested so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(html)) => Ok(html),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(String::new()),
        }
    }
}

// =============================================================================
// Mock Analyzer
// =============================================================================

pub struct MockAnalyzer {
    record: JobAnalysis,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockAnalyzer {
    /// Analyzer that always returns the empty record.
    pub fn new() -> Self {
        Self::with_record(JobAnalysis::default())
    }

    pub fn with_record(record: JobAnalysis) -> Self {
        Self {
            record,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Texts passed to `analyze` so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAnalyzer for MockAnalyzer {
    async fn analyze(&self, text: &str) -> JobAnalysis {
        self.calls.lock().unwrap().push(text.to_string());
        self.record.clone()
    }
}

// =============================================================================
// Mock Blob Store
// =============================================================================

/// Arguments captured from a put call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCall {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
}

impl PutCall {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

pub struct MockBlobStore {
    puts: Arc<Mutex<Vec<PutCall>>>,
    fail_content_type: Option<String>,
    delay: Option<Duration>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            puts: Arc::new(Mutex::new(Vec::new())),
            fail_content_type: None,
            delay: None,
        }
    }

    /// Reject every put.
    pub fn failing() -> Self {
        Self {
            fail_content_type: Some(String::new()),
            ..Self::new()
        }
    }

    /// Reject puts of one content type only.
    pub fn failing_for(content_type: &str) -> Self {
        Self {
            fail_content_type: Some(content_type.to_string()),
            ..Self::new()
        }
    }

    /// Sleep before every put.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Successful puts so far.
    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().unwrap().clone()
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBlobStore for MockBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failing) = &self.fail_content_type {
            if failing.is_empty() || failing == content_type {
                return Err(anyhow!("storage unavailable"));
            }
        }
        self.puts.lock().unwrap().push(PutCall {
            key: key.to_string(),
            body,
            content_type: content_type.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// In-Memory Job Store
// =============================================================================

/// `JobStore` holding jobs in a mutex-guarded list.
///
/// Enforces the same lease and terminal-write rules as `PostgresJobStore`,
/// and can inject queue outages and terminal-write failures.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<ScrapeJob>>,
    acquire_failures: AtomicUsize,
    fail_terminal_writes: Mutex<bool>,
    acquire_calls: AtomicUsize,
    completed_calls: Mutex<Vec<(Uuid, String)>>,
    failed_calls: Mutex<Vec<(Uuid, String)>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = ScrapeJob>) -> Self {
        let store = Self::new();
        store.jobs.lock().unwrap().extend(jobs);
        store
    }

    /// Make the next `count` calls to `acquire_next` fail.
    pub fn fail_next_acquires(&self, count: usize) {
        self.acquire_failures.store(count, Ordering::SeqCst);
    }

    /// Make every `mark_completed`/`mark_failed` call fail.
    pub fn fail_terminal_writes(&self, fail: bool) {
        *self.fail_terminal_writes.lock().unwrap() = fail;
    }

    pub fn job(&self, job_id: Uuid) -> Option<ScrapeJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|job| job.id == job_id)
            .cloned()
    }

    pub fn jobs(&self) -> Vec<ScrapeJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn completed_calls(&self) -> Vec<(Uuid, String)> {
        self.completed_calls.lock().unwrap().clone()
    }

    pub fn failed_calls(&self) -> Vec<(Uuid, String)> {
        self.failed_calls.lock().unwrap().clone()
    }

    /// Move a job's lease back in time (for stale-lease tests).
    pub fn backdate_lease(&self, job_id: Uuid, by: Duration) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|job| job.id == job_id) {
            if let Some(started_at) = job.started_at {
                job.started_at = chrono::Duration::from_std(by)
                    .ok()
                    .and_then(|by| started_at.checked_sub_signed(by));
            }
        }
    }

    fn terminal_writes_failing(&self) -> bool {
        *self.fail_terminal_writes.lock().unwrap()
    }

    fn finish(&self, job_id: Uuid, apply: impl FnOnce(&mut ScrapeJob)) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|job| job.id == job_id && job.status == ScrapeJobStatus::Processing)
        {
            apply(job);
            job.updated_at = Utc::now();
        }
    }

    fn is_stale(job: &ScrapeJob, older_than: Duration) -> bool {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|by| Utc::now().checked_sub_signed(by));
        job.status == ScrapeJobStatus::Processing
            && matches!((job.started_at, cutoff), (Some(started), Some(cutoff)) if started < cutoff)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn acquire_next(&self) -> Result<Option<ScrapeJob>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);

        let outage = self
            .acquire_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if outage {
            return Err(anyhow!("queue unavailable"));
        }

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs
            .iter_mut()
            .find(|job| job.status == ScrapeJobStatus::Pending)
        else {
            return Ok(None);
        };

        let now = Utc::now();
        job.status = ScrapeJobStatus::Processing;
        job.started_at = Some(now);
        job.attempt_count += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_completed(&self, job_id: Uuid, result_key: &str) -> Result<()> {
        self.completed_calls
            .lock()
            .unwrap()
            .push((job_id, result_key.to_string()));
        if self.terminal_writes_failing() {
            return Err(anyhow!("queue unavailable"));
        }

        self.finish(job_id, |job| {
            job.status = ScrapeJobStatus::Completed;
            job.result_key = Some(result_key.to_string());
            job.error_message = None;
        });
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<()> {
        self.failed_calls
            .lock()
            .unwrap()
            .push((job_id, error_message.to_string()));
        if self.terminal_writes_failing() {
            return Err(anyhow!("queue unavailable"));
        }

        self.finish(job_id, |job| {
            job.status = ScrapeJobStatus::Failed;
            job.error_message = Some(error_message.to_string());
        });
        Ok(())
    }

    async fn count_stale(&self, older_than: Duration) -> Result<u64> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|job| Self::is_stale(job, older_than)).count() as u64)
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut requeued = 0;
        for job in jobs.iter_mut().filter(|job| Self::is_stale(job, older_than)) {
            job.status = ScrapeJobStatus::Pending;
            job.updated_at = Utc::now();
            requeued += 1;
        }
        Ok(requeued)
    }
}

// =============================================================================
// Mock Job Handler
// =============================================================================

/// Returns queued outcomes in order; defaults to success with a derived key.
pub struct MockJobHandler {
    outcomes: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    executed: Mutex<Vec<Uuid>>,
}

impl MockJobHandler {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            delay: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_success(self, result_key: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(result_key.to_string()));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    /// Sleep inside every execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<Uuid> {
        self.executed.lock().unwrap().clone()
    }
}

impl Default for MockJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for MockJobHandler {
    async fn execute(&self, job: &ScrapeJob) -> Result<String> {
        self.executed.lock().unwrap().push(job.id);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Ok(key)) => Ok(key),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(format!("results/{}", job.id)),
        }
    }
}

// =============================================================================
// Test Dependencies
// =============================================================================

/// Mock collaborators shared between a test and the `WorkerDeps` under test.
pub struct TestDependencies {
    pub page_fetcher: Arc<MockPageFetcher>,
    pub analyzer: Option<Arc<MockAnalyzer>>,
    pub blob_store: Arc<MockBlobStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            page_fetcher: Arc::new(MockPageFetcher::new()),
            analyzer: None,
            blob_store: Arc::new(MockBlobStore::new()),
        }
    }

    pub fn mock_fetcher(mut self, fetcher: MockPageFetcher) -> Self {
        self.page_fetcher = Arc::new(fetcher);
        self
    }

    pub fn mock_analyzer(mut self, analyzer: MockAnalyzer) -> Self {
        self.analyzer = Some(Arc::new(analyzer));
        self
    }

    pub fn mock_blob_store(mut self, store: MockBlobStore) -> Self {
        self.blob_store = Arc::new(store);
        self
    }

    pub fn deps(&self) -> WorkerDeps {
        WorkerDeps::new(
            self.page_fetcher.clone(),
            self.analyzer
                .clone()
                .map(|analyzer| analyzer as Arc<dyn BaseAnalyzer>),
            self.blob_store.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
