use uuid::Uuid;

/// Prefix shared by every artifact this worker writes.
pub const KEY_PREFIX: &str = "scraper";

/// Kinds of artifact produced for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Normalized page text.
    Content,
    /// Analyzer output serialized as JSON.
    Analysis,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Content => "html",
            Self::Analysis => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Content => "text/html",
            Self::Analysis => "application/json",
        }
    }
}

/// Deterministic key for an artifact: `scraper/{owner_id}/{position_id}.{ext}`.
pub fn artifact_key(owner_id: Uuid, position_id: Uuid, kind: ArtifactKind) -> String {
    format!("{}/{}/{}.{}", KEY_PREFIX, owner_id, position_id, kind.extension())
}
