//! Answer generation provider trait.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The backend answered with a non-success HTTP status.
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Opens a grounded prompt; the retrieved context follows it.
pub const CONTEXT_HEADER: &str = "Answer the question based on the following context:\n";

/// Separates context fragments within a grounded prompt.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Ends the context and introduces the question.
pub const QUESTION_MARKER: &str = "\n\nQuestion: ";

/// Black-box text generation used by the responder agent.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Check if the provider can currently serve requests.
    async fn is_available(&self) -> bool {
        true
    }

    /// Complete a prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model used for completions, if the provider has one.
    fn default_model(&self) -> Option<&str> {
        None
    }
}
