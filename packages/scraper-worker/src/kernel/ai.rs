//! Job posting analyzers.
//!
//! `OpenAiAnalyzer` talks to any OpenAI-compatible chat completions endpoint
//! (Groq by default). `FakeAnalyzer` returns a fixed record for local runs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::BaseAnalyzer;
use crate::domains::scraping::models::JobAnalysis;

const SYSTEM_PROMPT: &str = "You are a specialized parser for job postings. You must respond ONLY with a valid JSON object matching the requested schema. Use empty strings or lists for missing values.";

/// Default user prompt. `{text}` is replaced with the normalized page text.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"Extract the following fields from the job posting below and return them as a JSON object:
- "title": the job title
- "published_at": the publication date as written on the page
- "requirements": a list of required skills or qualifications
- "summary": a two-sentence summary of the role
- "stack": a list of technologies, languages, and tools mentioned
- "salary": the salary or compensation range as written on the page

Job posting:
{text}"#;

/// Errors absorbed by the analyzer before they reach the pipeline.
#[derive(Debug, Error)]
enum AnalyzerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Analyzer backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    prompt_template: String,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: model.into(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    fn render_prompt(&self, text: &str) -> String {
        self.prompt_template.replace("{text}", text)
    }

    async fn request_analysis(&self, text: &str) -> Result<JobAnalysis, AnalyzerError> {
        let start = std::time::Instant::now();
        let prompt = self.render_prompt(text);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.0,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Api(format!("{}: {}", status, error_text)));
        }

        let chat_response: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalyzerError::Api("No response content".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "analysis completion"
        );

        serde_json::from_str(&content).map_err(|e| AnalyzerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl BaseAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, text: &str) -> JobAnalysis {
        match self.request_analysis(text).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(model = %self.model, error = %e, "analysis failed, using empty record");
                JobAnalysis::default()
            }
        }
    }
}

/// Analyzer that ignores its input and returns a fixed record.
#[derive(Debug, Clone, Default)]
pub struct FakeAnalyzer;

impl FakeAnalyzer {
    pub fn record() -> JobAnalysis {
        JobAnalysis {
            title: "Software Engineer (Fake)".to_string(),
            published_at: "2026-02-11".to_string(),
            requirements: vec![
                "Python".to_string(),
                "Rust".to_string(),
                "Unit Testing".to_string(),
            ],
            summary: "A high-impact role in a fake environment.".to_string(),
            stack: vec![
                "FastAPI".to_string(),
                "Postgres".to_string(),
                "Docker".to_string(),
            ],
            salary: "€100K - €120K".to_string(),
        }
    }
}

#[async_trait]
impl BaseAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _text: &str) -> JobAnalysis {
        Self::record()
    }
}
