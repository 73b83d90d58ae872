use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::orchestrator::GenerationSettings;
use crate::generation::prompts::MAX_CONTEXT_CHARS;
use crate::llm_client::SamplingParams;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent: projects live in memory for the life of the process.
    pub database_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub generation: GenerationSettings,
    pub sampling: SamplingParams,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = GenerationSettings::default();
        let sampling = SamplingParams::default();

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            generation: GenerationSettings {
                concurrency: env_or("GENERATION_CONCURRENCY", defaults.concurrency)?.max(1),
                section_timeout: Duration::from_secs(env_or(
                    "SECTION_TIMEOUT_SECS",
                    defaults.section_timeout.as_secs(),
                )?),
                max_context_chars: env_or("MAX_CONTEXT_CHARS", MAX_CONTEXT_CHARS)?,
            },
            sampling: SamplingParams {
                temperature: env_or("LLM_TEMPERATURE", sampling.temperature)?,
                top_p: env_or("LLM_TOP_P", sampling.top_p)?,
                top_k: env_or("LLM_TOP_K", sampling.top_k)?,
                max_output_tokens: env_or("LLM_MAX_OUTPUT_TOKENS", sampling.max_output_tokens)?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses `key` when set, otherwise returns `default`.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'"))
}
