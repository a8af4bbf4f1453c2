use serde::{Deserialize, Deserializer, Serialize};

/// Structured summary of a job posting.
///
/// Every field defaults to empty, so a partial or `null`-filled model answer
/// still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAnalysis {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub published_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub requirements: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub stack: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub salary: String,
}

impl JobAnalysis {
    /// True when the record carries no information (the analyzer fallback).
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
