//! Generation and embedding providers.

use std::sync::Arc;

pub mod embedder;
pub mod extractive;
pub mod ollama;
pub mod provider;

pub use embedder::{Embedder, EmbeddingError, HashEmbedder};
pub use provider::{Provider, ProviderError, Result};

use crate::config::Settings;

/// Provider factory.
pub fn create_provider(settings: &Settings) -> Arc<dyn Provider> {
    let generation = &settings.generation;
    match generation.provider.as_str() {
        "ollama" => Arc::new(ollama::OllamaProvider::new(
            generation.base_url.clone(),
            generation.model.clone(),
        )),
        "extractive" => Arc::new(extractive::ExtractiveProvider::new()),
        other => {
            tracing::warn!("Unknown generation provider '{}', using extractive", other);
            Arc::new(extractive::ExtractiveProvider::new())
        }
    }
}

/// Embedder factory. The store dimension is authoritative for every backend.
pub fn create_embedder(settings: &Settings) -> Arc<dyn Embedder> {
    let embedding = &settings.embedding;
    let dimension = settings.store.dimension;
    match embedding.provider.as_str() {
        "ollama" => Arc::new(ollama::OllamaEmbedder::new(
            embedding.base_url.clone(),
            embedding.model.clone(),
            dimension,
        )),
        "hash" => Arc::new(HashEmbedder::new(dimension)),
        other => {
            tracing::warn!("Unknown embedding provider '{}', using hash", other);
            Arc::new(HashEmbedder::new(dimension))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_follow_settings() {
        let mut settings = Settings::default();
        assert_eq!(create_provider(&settings).name(), "extractive");
        assert_eq!(create_embedder(&settings).dimension(), 384);

        settings.generation.provider = "ollama".to_string();
        settings.store.dimension = 16;
        assert_eq!(create_provider(&settings).name(), "ollama");
        assert_eq!(create_embedder(&settings).dimension(), 16);
    }
}
