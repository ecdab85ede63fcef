//! TOML configuration.
//!
//! ```toml
//! [notion]
//! database_id = "0f3c…"
//! keywords_property = "Keywords"
//!
//! [retrieval]
//! relevance_threshold = 0.1
//! max_results = 3
//!
//! [cache]
//! ttl_secs = 600
//!
//! [generator]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Secrets never live in the file: the Notion token and generator API keys
//! are read from the environment variables named by `token_env` and
//! `api_key_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::corpus::FieldMapping;
use crate::index::NgramRange;
use crate::select::SelectParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub notion: NotionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    pub database_id: String,
    #[serde(default = "default_notion_api_url")]
    pub api_url: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
    #[serde(default = "default_notion_token_env")]
    pub token_env: String,
    /// Property holding the title. Defaults to whichever property is of
    /// type `title`.
    #[serde(default)]
    pub title_property: Option<String>,
    #[serde(default = "default_keywords_property")]
    pub keywords_property: String,
    #[serde(default = "default_notion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_notion_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}
fn default_notion_token_env() -> String {
    "NOTION_API_KEY".to_string()
}
fn default_keywords_property() -> String {
    "Keywords".to_string()
}
fn default_notion_timeout_secs() -> u64 {
    30
}
fn default_notion_max_retries() -> u32 {
    3
}
fn default_page_size() -> u32 {
    100
}

impl NotionConfig {
    pub fn field_mapping(&self) -> FieldMapping {
        FieldMapping {
            title_property: self.title_property.clone(),
            keywords_property: self.keywords_property.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Drop candidates at least this similar to a better-ranked one.
    /// Absent means no dedup.
    #[serde(default)]
    pub dedup_similarity: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            max_results: default_max_results(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            dedup_similarity: None,
        }
    }
}

fn default_relevance_threshold() -> f64 {
    0.1
}
fn default_max_results() -> usize {
    3
}
fn default_ngram_min() -> usize {
    2
}
fn default_ngram_max() -> usize {
    3
}

impl RetrievalConfig {
    pub fn select_params(&self) -> SelectParams {
        SelectParams {
            relevance_threshold: self.relevance_threshold,
            max_results: self.max_results,
            dedup_similarity: self.dedup_similarity,
        }
    }

    pub fn ngram_range(&self) -> Result<NgramRange> {
        Ok(NgramRange::new(self.ngram_min, self.ngram_max)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    600
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint override (proxies, compatible gateways, tests).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
    /// Replaces the default instruction preamble sent before the question.
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: None,
            timeout_secs: default_generator_timeout_secs(),
            instructions: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_generator_timeout_secs() -> u64 {
    60
}

impl GeneratorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Environment variable holding the provider's API key.
    pub fn resolved_api_key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "gemini") => "GEMINI_API_KEY",
            (None, _) => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.notion.database_id.trim().is_empty() {
        anyhow::bail!("notion.database_id must not be empty");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    if !(0.0..1.0).contains(&retrieval.relevance_threshold) {
        anyhow::bail!("retrieval.relevance_threshold must be in [0.0, 1.0)");
    }
    if retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if retrieval.ngram_min < 1 || retrieval.ngram_min > retrieval.ngram_max {
        anyhow::bail!("retrieval n-gram range must satisfy 1 <= ngram_min <= ngram_max");
    }
    if let Some(sim) = retrieval.dedup_similarity {
        if !(sim > 0.0 && sim <= 1.0) {
            anyhow::bail!("retrieval.dedup_similarity must be in (0.0, 1.0]");
        }
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be >= 1");
    }

    // Validate generator
    match config.generator.provider.as_str() {
        "disabled" | "openai" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generator provider: '{}'. Must be disabled, openai, or gemini.",
            other
        ),
    }
    if config.generator.is_enabled() && config.generator.model.is_none() {
        anyhow::bail!(
            "generator.model must be specified when provider is '{}'",
            config.generator.provider
        );
    }

    Ok(config)
}
