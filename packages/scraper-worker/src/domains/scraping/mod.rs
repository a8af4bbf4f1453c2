// Scraping domain - turns a leased job into stored artifacts.

pub mod models;
pub mod pipeline;
pub mod storage_key;

pub use models::JobAnalysis;
pub use pipeline::{PipelineError, PipelineRun, PipelineState, ScrapePipeline};
pub use storage_key::{artifact_key, ArtifactKind};
