//! Generation contract: per-attempt timeout and bounded retries.
//!
//! Failures are classified from the typed provider error. Transient
//! classes are retried; a rejected credential or an unknown model fails
//! on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::providers::{Provider, ProviderError};

#[derive(Debug, Clone)]
pub struct ExecutionContract {
    pub timeout_seconds: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionContract {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for ExecutionContract {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            timeout_seconds: config.timeout_seconds,
            retries: config.retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    Timeout,
    Unauthorized,
    ProviderUnavailable,
    ModelMissing,
    Unknown,
}

impl FailureCode {
    fn from_error(error: &ProviderError) -> Self {
        match error {
            ProviderError::Status { status: 401 | 403, .. } => FailureCode::Unauthorized,
            ProviderError::Status { status: 404, .. } => FailureCode::ModelMissing,
            ProviderError::Status { status, .. } if *status >= 500 => {
                FailureCode::ProviderUnavailable
            }
            ProviderError::Status { .. } => FailureCode::Unknown,
            ProviderError::HttpError(e) if e.is_timeout() => FailureCode::Timeout,
            ProviderError::HttpError(e) if e.is_connect() => FailureCode::ProviderUnavailable,
            ProviderError::HttpError(_) => FailureCode::Unknown,
        }
    }

    /// Another attempt cannot fix a rejected credential or a missing model.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureCode::Unauthorized | FailureCode::ModelMissing)
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureCode::Timeout => "timeout",
            FailureCode::Unauthorized => "unauthorized",
            FailureCode::ProviderUnavailable => "provider_unavailable",
            FailureCode::ModelMissing => "model_missing",
            FailureCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The last failure once the contract gives up.
#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub code: FailureCode,
    pub message: String,
    pub attempts: u32,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} (after {} attempt{})",
            self.code,
            self.message,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" }
        )
    }
}

impl std::error::Error for ExecutionError {}

/// Run one completion under `contract`.
pub async fn execute_with_contract(
    provider: Arc<dyn Provider>,
    prompt: &str,
    contract: &ExecutionContract,
) -> Result<String, ExecutionError> {
    let max_attempts = contract.retries + 1;
    let timeout = Duration::from_secs(contract.timeout_seconds);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = tokio::time::timeout(timeout, provider.complete(prompt)).await;
        let (code, message) = match outcome {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => (FailureCode::from_error(&e), e.to_string()),
            Err(_) => (
                FailureCode::Timeout,
                format!("no completion within {}s", contract.timeout_seconds),
            ),
        };

        tracing::warn!(
            provider = provider.name(),
            code = %code,
            "Generation attempt {}/{} failed: {}",
            attempt,
            max_attempts,
            message
        );

        if !code.is_retryable() || attempt >= max_attempts {
            return Err(ExecutionError {
                code,
                message,
                attempts: attempt,
            });
        }
        tokio::time::sleep(Duration::from_millis(contract.retry_backoff_ms)).await;
    }
}
