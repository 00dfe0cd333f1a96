//! Configuration loading for docrelay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Get the docrelay home directory (~/.docrelay).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".docrelay"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.docrelay/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let mut settings: Settings = serde_json::from_str(&content)?;

    if settings.store.dir.is_none() {
        settings.store.dir = Some(get_home_dir()?.join("vector_db"));
    }

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return defaults if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        let mut settings = Settings::default();
        settings.store.dir = get_home_dir().ok().map(|home| home.join("vector_db"));
        settings
    })
}

/// Reject values the runtime cannot work with.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.store.dimension == 0 {
        return Err(Error::Config("store.dimension must be positive".to_string()));
    }
    if settings.bus.queue_capacity == 0 {
        return Err(Error::Config("bus.queue_capacity must be positive".to_string()));
    }
    if settings.pipeline.top_k == 0 {
        return Err(Error::Config("pipeline.top_k must be positive".to_string()));
    }
    if settings.extraction.chunk_size == 0 {
        return Err(Error::Config(
            "extraction.chunk_size must be positive".to_string(),
        ));
    }
    Ok(())
}

/// What the bus does with an envelope nobody is subscribed to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UndeliverablePolicy {
    /// Drop silently.
    Drop,
    /// Drop and log a warning.
    #[default]
    Warn,
    /// Fail the send with a delivery error.
    Reject,
}

/// Vector store configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding the index snapshot. `None` keeps the store in memory.
    pub dir: Option<PathBuf>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
}

fn default_dimension() -> usize {
    384
}

fn default_persist_retries() -> u32 {
    2
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            dimension: default_dimension(),
            persist_retries: default_persist_retries(),
        }
    }
}

/// Message bus configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BusConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub undeliverable: UndeliverablePolicy,
    /// Number of envelopes kept in the journal; 0 disables it.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_journal_capacity() -> usize {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            undeliverable: UndeliverablePolicy::default(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

/// Agent pipeline configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_seconds: u64,
}

fn default_top_k() -> usize {
    3
}

fn default_answer_timeout() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            answer_timeout_seconds: default_answer_timeout(),
        }
    }
}

/// Text extraction configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExtractionConfig {
    /// Maximum characters per chunk. This is a character count, not a token count.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    500
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Embedding backend configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmbeddingConfig {
    /// `hash` (offline) or `ollama`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            base_url: None,
        }
    }
}

/// Answer generation configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GenerationConfig {
    /// `ollama` or `extractive` (offline).
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_generation_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_generation_provider() -> String {
    "extractive".to_string()
}

fn default_generation_timeout() -> u64 {
    240
}

fn default_generation_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    600
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            base_url: None,
            timeout_seconds: default_generation_timeout(),
            retries: default_generation_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// docrelay settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}
