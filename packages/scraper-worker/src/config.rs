use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub worker_id: String,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// `None` disables per-step timeouts.
    pub step_timeout: Option<Duration>,
    pub ngram_max: usize,
    pub fetch_timeout: Duration,
    pub storage: StorageConfig,
    pub analyzer: AnalyzerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        allow_http: bool,
    },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerConfig {
    Disabled,
    OpenAi {
        api_key: String,
        base_url: String,
        model: String,
    },
    Fake,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let step_timeout_secs: u64 = parse_or(&get, "STEP_TIMEOUT_SECS", 120)?;

        Ok(Self {
            database_url: get("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            run_migrations: parse_bool(&get, "DATABASE_RUN_MIGRATIONS", false)?,
            worker_id: get("WORKER_ID")
                .unwrap_or_else(|| format!("scraper-{}", Uuid::new_v4())),
            poll_interval: parse_seconds(&get, "POLL_INTERVAL", 1.0)?,
            error_backoff: parse_seconds(&get, "ERROR_BACKOFF", 5.0)?,
            step_timeout: (step_timeout_secs > 0).then(|| Duration::from_secs(step_timeout_secs)),
            ngram_max: parse_or(&get, "NGRAM_MAX", 20)?,
            fetch_timeout: Duration::from_secs(parse_or(&get, "FETCH_TIMEOUT_SECS", 30)?),
            storage: StorageConfig::from_lookup(&get)?,
            analyzer: AnalyzerConfig::from_lookup(&get)?,
            observability: ObservabilityConfig {
                enabled: parse_bool(&get, "OBS_ENABLED", false)?,
                service_name: get("SERVICE_NAME").unwrap_or_else(|| "scraper-worker".to_string()),
                otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|| "http://localhost:4317".to_string()),
            },
        })
    }
}

impl StorageConfig {
    fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = get("STORAGE_BACKEND").unwrap_or_else(|| "s3".to_string());

        match backend.to_ascii_lowercase().as_str() {
            "s3" => {
                let endpoint = get("AWS_ENDPOINT_URL");
                let default_allow_http = endpoint
                    .as_deref()
                    .is_some_and(|url| url.starts_with("http://"));

                Ok(Self::S3 {
                    bucket: get("S3_BUCKET_NAME").unwrap_or_else(|| "scraper".to_string()),
                    region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    allow_http: parse_bool(get, "S3_ALLOW_HTTP", default_allow_http)?,
                    endpoint,
                    access_key_id: get("AWS_ACCESS_KEY_ID"),
                    secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
                })
            }
            "memory" => Ok(Self::Memory),
            other => bail!("STORAGE_BACKEND must be 's3' or 'memory', got '{}'", other),
        }
    }
}

impl AnalyzerConfig {
    fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = get("ANALYZER_BACKEND").unwrap_or_else(|| "none".to_string());

        match backend.to_ascii_lowercase().as_str() {
            "none" | "disabled" => Ok(Self::Disabled),
            "fake" => Ok(Self::Fake),
            "openai" | "groq" => Ok(Self::OpenAi {
                api_key: get("ANALYZER_API_KEY")
                    .or_else(|| get("GROQ_API_TOKEN"))
                    .context("ANALYZER_API_KEY must be set when ANALYZER_BACKEND=openai")?,
                base_url: get("ANALYZER_BASE_URL")
                    .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
                model: get("ANALYZER_MODEL")
                    .or_else(|| get("GROQ_MODEL"))
                    .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            }),
            other => bail!(
                "ANALYZER_BACKEND must be 'none', 'openai' or 'fake', got '{}'",
                other
            ),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

fn parse_seconds(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: f64,
) -> Result<Duration> {
    let secs: f64 = parse_or(get, key, default)?;
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("{} must be a non-negative number of seconds", key))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => bail!("{} must be true or false, got '{}'", key, other),
        },
        None => Ok(default),
    }
}
