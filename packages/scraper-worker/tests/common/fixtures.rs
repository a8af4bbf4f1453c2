//! Job and page fixtures shared by integration tests.

use scraper_core::kernel::jobs::ScrapeJob;
use uuid::Uuid;

pub fn pending_job(url: &str) -> ScrapeJob {
    ScrapeJob::pending(url, Uuid::new_v4(), Uuid::new_v4())
}

pub fn pending_jobs(count: usize) -> Vec<ScrapeJob> {
    (0..count)
        .map(|i| pending_job(&format!("https://jobs.example.org/postings/{}", i)))
        .collect()
}

/// A job posting page with the usual navigation and footer noise.
pub const POSTING_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Senior Rust Engineer</title>
  <style>.nav { display: flex; }</style>
  <script>window.analytics = { track: function () {} };</script>
</head>
<body>
  <nav><a href="/">Home</a><a href="/jobs">Jobs</a><a href="/jobs">Jobs</a><a href="/about">About</a></nav>
  <main>
    <h1>Senior Rust Engineer</h1>
    <p>We build low-latency data pipelines in Rust and Postgres.</p>
    <ul><li>Tokio</li><li>SQL</li><li>Kubernetes</li></ul>
    <p>We build low-latency data pipelines in Rust and Postgres.</p>
    <p>Salary: <strong>€90K</strong> - <strong>€110K</strong></p>
  </main>
  <footer><a href="/">Home</a><a href="/privacy">Privacy</a></footer>
  <noscript>Please enable JavaScript</noscript>
</body>
</html>"#;
