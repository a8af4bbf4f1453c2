//! Lease protocol tests.
//!
//! The in-memory store runs everywhere. The Postgres tests exercise the real
//! `SKIP LOCKED` query and need Docker:
//!
//! ```text
//! cargo test -p scraper-worker --test lease_tests -- --ignored
//! ```

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{pending_job, pending_jobs, TestHarness};
use scraper_core::kernel::jobs::{JobStore, ScrapeJobStatus};
use scraper_core::kernel::test_dependencies::InMemoryJobStore;
use test_context::test_context;
use uuid::Uuid;

/// Spawn `callers` tasks that each call `acquire_next` until the queue is
/// empty, returning every job id they leased.
async fn drain_concurrently(store: Arc<dyn JobStore>, callers: usize) -> Vec<Uuid> {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut leased = Vec::new();
                while let Some(job) = store.acquire_next().await.unwrap() {
                    leased.push(job.id);
                    tokio::task::yield_now().await;
                }
                leased
            })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .flat_map(|leased| leased.unwrap())
        .collect()
}

/// Race `callers` single acquisitions against each other.
async fn race_single_acquire(store: Arc<dyn JobStore>, callers: usize) -> Vec<(Uuid, i32)> {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.acquire_next().await.unwrap() })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|result| result.unwrap().map(|job| (job.id, job.attempt_count)))
        .collect()
}

// =============================================================================
// In-memory store
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquirers_never_share_a_job() {
    let jobs = pending_jobs(25);
    let expected: HashSet<Uuid> = jobs.iter().map(|job| job.id).collect();
    let store = Arc::new(InMemoryJobStore::with_jobs(jobs));

    let leased = drain_concurrently(store.clone(), 8).await;

    let unique: HashSet<Uuid> = leased.iter().copied().collect();
    assert_eq!(leased.len(), 25, "every job leased exactly once");
    assert_eq!(unique, expected);
    assert!(store
        .jobs()
        .iter()
        .all(|job| job.status == ScrapeJobStatus::Processing && job.attempt_count == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_callers_than_jobs_yields_min_of_both() {
    let store = Arc::new(InMemoryJobStore::with_jobs(pending_jobs(3)));

    let acquired: Vec<Uuid> = race_single_acquire(store, 10)
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    assert_eq!(acquired.len(), 3);
    assert_eq!(acquired.iter().collect::<HashSet<_>>().len(), 3);
}

#[tokio::test]
async fn acquire_returns_none_when_nothing_pending() {
    let store = InMemoryJobStore::new();
    assert!(store.acquire_next().await.unwrap().is_none());
}

#[tokio::test]
async fn acquire_stamps_lease_fields() {
    let job = pending_job("https://jobs.example.org/postings/1");
    let store = InMemoryJobStore::with_jobs([job.clone()]);

    let leased = store.acquire_next().await.unwrap().unwrap();

    assert_eq!(leased.id, job.id);
    assert_eq!(leased.status, ScrapeJobStatus::Processing);
    assert_eq!(leased.attempt_count, job.attempt_count + 1);
    assert!(leased.started_at.is_some());
    assert_eq!(leased.url, job.url);
}

#[tokio::test]
async fn attempt_count_grows_by_one_per_lease() {
    let job = pending_job("https://jobs.example.org/postings/1");
    let store = InMemoryJobStore::with_jobs([job.clone()]);

    for expected_attempt in 1..=3 {
        let leased = store.acquire_next().await.unwrap().unwrap();
        assert_eq!(leased.attempt_count, expected_attempt);

        store.backdate_lease(job.id, Duration::from_secs(7200));
        assert_eq!(store.requeue_stale(Duration::from_secs(3600)).await.unwrap(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requeued_job_goes_to_exactly_one_racer() {
    let job = pending_job("https://jobs.example.org/postings/1");
    let store = Arc::new(InMemoryJobStore::with_jobs([job.clone()]));

    let first = store.acquire_next().await.unwrap().unwrap();
    assert_eq!(first.attempt_count, 1);
    store.backdate_lease(job.id, Duration::from_secs(7200));
    assert_eq!(store.requeue_stale(Duration::from_secs(3600)).await.unwrap(), 1);

    let winners = race_single_acquire(store.clone(), 8).await;

    assert_eq!(winners, vec![(job.id, 2)]);
    assert_eq!(store.job(job.id).unwrap().status, ScrapeJobStatus::Processing);
}

#[tokio::test]
async fn terminal_write_applies_once() {
    let job = pending_job("https://jobs.example.org/postings/1");
    let store = InMemoryJobStore::with_jobs([job.clone()]);
    store.acquire_next().await.unwrap();

    store.mark_completed(job.id, "scraper/a/b.html").await.unwrap();
    store.mark_failed(job.id, "late failure").await.unwrap();
    store.mark_completed(job.id, "scraper/other.html").await.unwrap();

    let stored = store.job(job.id).unwrap();
    assert_eq!(stored.status, ScrapeJobStatus::Completed);
    assert_eq!(stored.result_key.as_deref(), Some("scraper/a/b.html"));
    assert!(stored.error_message.is_none());
}

#[tokio::test]
async fn terminal_write_ignored_for_pending_job() {
    let job = pending_job("https://jobs.example.org/postings/1");
    let store = InMemoryJobStore::with_jobs([job.clone()]);

    store.mark_failed(job.id, "never leased").await.unwrap();

    assert_eq!(store.job(job.id).unwrap().status, ScrapeJobStatus::Pending);
}

#[tokio::test]
async fn requeue_leaves_fresh_leases_alone() {
    let store = InMemoryJobStore::with_jobs(pending_jobs(2));
    let stale = store.acquire_next().await.unwrap().unwrap();
    let fresh = store.acquire_next().await.unwrap().unwrap();
    store.backdate_lease(stale.id, Duration::from_secs(7200));

    assert_eq!(store.count_stale(Duration::from_secs(3600)).await.unwrap(), 1);
    assert_eq!(store.requeue_stale(Duration::from_secs(3600)).await.unwrap(), 1);

    assert_eq!(store.job(stale.id).unwrap().status, ScrapeJobStatus::Pending);
    assert_eq!(store.job(fresh.id).unwrap().status, ScrapeJobStatus::Processing);
}

#[tokio::test]
async fn queue_outage_surfaces_as_error() {
    let store = InMemoryJobStore::with_jobs(pending_jobs(1));
    store.fail_next_acquires(1);

    assert!(store.acquire_next().await.is_err());
    assert!(store.acquire_next().await.unwrap().is_some());
}

// =============================================================================
// Postgres store
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn postgres_concurrent_acquirers_never_share_a_job(ctx: &mut TestHarness) {
    let mut expected = HashSet::new();
    for job in pending_jobs(40) {
        expected.insert(ctx.store.enqueue(&job).await.unwrap().id);
    }

    let leased = drain_concurrently(Arc::new(ctx.store.clone()), 10).await;

    let unique: HashSet<Uuid> = leased.iter().copied().collect();
    assert_eq!(leased.len(), 40);
    assert_eq!(unique, expected);

    let attempts: Vec<i32> = sqlx::query_scalar("SELECT attempt_count FROM scraper_queue")
        .fetch_all(&ctx.db_pool)
        .await
        .unwrap();
    assert!(attempts.iter().all(|&attempt| attempt == 1));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn postgres_lease_and_complete(ctx: &mut TestHarness) {
    let job = ctx
        .store
        .enqueue(&pending_job("https://jobs.example.org/postings/1").with_trace_context(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ))
        .await
        .unwrap();

    let leased = ctx.store.acquire_next().await.unwrap().unwrap();
    assert_eq!(leased.id, job.id);
    assert_eq!(leased.status, ScrapeJobStatus::Processing);
    assert_eq!(leased.attempt_count, 1);
    assert!(leased.started_at.is_some());
    assert_eq!(leased.trace_context, job.trace_context);

    assert!(ctx.store.acquire_next().await.unwrap().is_none());

    ctx.store
        .mark_completed(job.id, "scraper/owner/position.html")
        .await
        .unwrap();
    ctx.store.mark_failed(job.id, "late failure").await.unwrap();

    let stored = ctx.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScrapeJobStatus::Completed);
    assert_eq!(stored.result_key.as_deref(), Some("scraper/owner/position.html"));
    assert!(stored.error_message.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn postgres_requeue_stale_lease(ctx: &mut TestHarness) {
    let job = ctx
        .store
        .enqueue(&pending_job("https://jobs.example.org/postings/1"))
        .await
        .unwrap();
    ctx.store.acquire_next().await.unwrap().unwrap();

    sqlx::query("UPDATE scraper_queue SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(job.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let older_than = Duration::from_secs(3600);
    assert_eq!(ctx.store.count_stale(older_than).await.unwrap(), 1);
    assert_eq!(ctx.store.requeue_stale(older_than).await.unwrap(), 1);

    let retried = ctx.store.acquire_next().await.unwrap().unwrap();
    assert_eq!(retried.id, job.id);
    assert_eq!(retried.attempt_count, 2);
}

#[test_context(TestHarness)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn postgres_requeued_job_goes_to_exactly_one_racer(ctx: &mut TestHarness) {
    let job = ctx
        .store
        .enqueue(&pending_job("https://jobs.example.org/postings/1"))
        .await
        .unwrap();
    ctx.store.acquire_next().await.unwrap().unwrap();

    sqlx::query("UPDATE scraper_queue SET started_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(job.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(ctx.store.requeue_stale(Duration::from_secs(3600)).await.unwrap(), 1);

    let winners = race_single_acquire(Arc::new(ctx.store.clone()), 10).await;

    assert_eq!(winners, vec![(job.id, 2)]);
    let stored = ctx.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScrapeJobStatus::Processing);
    assert_eq!(stored.attempt_count, 2);
}
