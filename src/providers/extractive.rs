//! Offline provider that answers with retrieved text instead of generating.

use async_trait::async_trait;

use super::provider::{Provider, Result, CONTEXT_HEADER, CONTEXT_SEPARATOR, QUESTION_MARKER};

/// Returns the first context fragment of a grounded prompt verbatim.
#[derive(Debug, Default, Clone)]
pub struct ExtractiveProvider;

impl ExtractiveProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for ExtractiveProvider {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .strip_prefix(CONTEXT_HEADER)
            .and_then(|rest| rest.split(QUESTION_MARKER).next())
            .unwrap_or("");

        let best = context.split(CONTEXT_SEPARATOR).next().unwrap_or("").trim();
        if best.is_empty() {
            return Ok("No relevant context found in the indexed documents.".to_string());
        }
        Ok(best.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::responder::build_prompt;

    #[tokio::test]
    async fn test_returns_first_fragment() {
        let prompt = format!(
            "{}Paris is the capital of France.\n---\nLyon is in France.\n\nQuestion: What is the capital of France?\nAnswer:",
            CONTEXT_HEADER
        );
        let answer = ExtractiveProvider::new().complete(&prompt).await.unwrap();
        assert_eq!(answer, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn test_empty_context() {
        let prompt = format!("{}\n\nQuestion: anything?\nAnswer:", CONTEXT_HEADER);
        let answer = ExtractiveProvider::new().complete(&prompt).await.unwrap();
        assert!(answer.starts_with("No relevant context"));
    }

    #[tokio::test]
    async fn test_reads_prompts_built_by_the_responder() {
        let context = vec!["Rome is in Italy.".to_string(), "Oslo is in Norway.".to_string()];
        let prompt = build_prompt(&context, "Where is Rome?");
        let answer = ExtractiveProvider::new().complete(&prompt).await.unwrap();
        assert_eq!(answer, "Rome is in Italy.");

        let provider = ExtractiveProvider::new();
        assert!(provider.is_available().await);
        assert_eq!(provider.default_model(), None);
    }
}
