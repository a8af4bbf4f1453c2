//! Kernel module - worker infrastructure and dependencies.

pub mod ai;
pub mod blob_store;
pub mod deps;
pub mod http_fetcher;
pub mod jobs;
pub mod observability;
pub mod test_dependencies;
pub mod traits;

pub use ai::{FakeAnalyzer, OpenAiAnalyzer};
pub use blob_store::ObjectBlobStore;
pub use deps::WorkerDeps;
pub use http_fetcher::HttpPageFetcher;
pub use traits::*;
