use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    pub llm: LlmConfig,

    pub image: ImageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "gemini" or "openai"
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    pub provider: String, // "gemini" or "openai"
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_min_steps")]
    pub min_steps: usize,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Max attempts per upstream generation call.
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Deliver a truncated tutorial when the image chain breaks mid-way,
    /// instead of failing the whole request.
    #[serde(default)]
    pub partial_tutorial_allowed: bool,

    /// In-flight generation calls across all requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_calls: usize,

    #[serde(default = "default_language")]
    pub target_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_steps: default_min_steps(),
            max_steps: default_max_steps(),
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay(),
            call_timeout_seconds: default_call_timeout(),
            partial_tutorial_allowed: false,
            max_concurrent_calls: default_max_concurrent(),
            target_language: default_language(),
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Backoff before retry number `attempt` (1-based), with jitter so that
    /// concurrent requests hitting the same provider don't retry in lock-step.
    pub fn backoff(&self, attempt: usize) -> Duration {
        if self.retry_delay_seconds == 0 {
            return Duration::ZERO;
        }
        let base = Duration::from_secs(self.retry_delay_seconds * attempt as u64);
        base + Duration::from_millis(rand::random::<u64>() % 500)
    }
}

fn default_port() -> u16 {
    8080
}
fn default_min_steps() -> usize {
    3
}
fn default_max_steps() -> usize {
    10
}
fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    2
}
fn default_call_timeout() -> u64 {
    120
}
fn default_max_concurrent() -> usize {
    4
}
fn default_language() -> String {
    "German".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = std::env::var("SKETCHTUTOR_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
        let path = Path::new(&path);
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content)?;
        if config.pipeline.min_steps == 0 || config.pipeline.min_steps > config.pipeline.max_steps {
            anyhow::bail!(
                "Invalid step bounds: min_steps={} max_steps={}",
                config.pipeline.min_steps,
                config.pipeline.max_steps
            );
        }
        if config.pipeline.max_concurrent_calls == 0 {
            anyhow::bail!("max_concurrent_calls must be at least 1");
        }
        Ok(config)
    }
}
