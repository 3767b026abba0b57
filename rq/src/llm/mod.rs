//! LLM provider clients and query orchestration

mod anthropic;
mod client;
mod error;
mod openai;
mod query;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use query::{QueryEngine, QueryEngineConfig};
pub use types::{LLMResponse, ProviderRequest, ProviderResponse, QueryRequest, StreamChunk, TokenUsage};

#[cfg(test)]
pub use client::mock;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::LlmConfig;

/// Split a model id into (provider, bare model name).
///
/// Ids without a provider prefix belong to openai, so plain `gpt-4o-mini`
/// and `openai/gpt-4o-mini` route identically.
pub fn split_model(model: &str) -> (&str, &str) {
    match model.split_once('/') {
        Some((provider, name)) => (provider, name),
        None => ("openai", model),
    }
}

/// Create a provider client for the given model id
pub fn create_client(config: &LlmConfig, model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
    let (provider, _) = split_model(model);
    debug!(%provider, %model, "create_client: called");

    match provider {
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{other}'. Supported providers: openai, anthropic"
        ))),
    }
}

/// Map a non-success HTTP response to the matching error variant.
///
/// 429 becomes `RateLimited` with the server's retry-after when present,
/// 401/403 become fatal `Auth`, and everything else is `ApiError` for the
/// retry policy to classify.
pub(crate) async fn error_for_status(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();

    if status == 429 {
        debug!("error_for_status: rate limited (429)");
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return LlmError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        };
    }

    let message = response.text().await.unwrap_or_default();
    if status == 401 || status == 403 {
        debug!(%status, "error_for_status: authentication failure");
        return LlmError::Auth(message);
    }

    debug!(%status, "error_for_status: API error");
    LlmError::ApiError { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_split_model_with_provider() {
        assert_eq!(split_model("openai/gpt-4o-mini"), ("openai", "gpt-4o-mini"));
        assert_eq!(split_model("anthropic/claude-sonnet-4"), ("anthropic", "claude-sonnet-4"));
    }

    #[test]
    fn test_split_model_bare_defaults_to_openai() {
        assert_eq!(split_model("gpt-4o-mini"), ("openai", "gpt-4o-mini"));
    }

    #[test]
    fn test_split_model_keeps_extra_segments() {
        assert_eq!(split_model("openai/ft:gpt-4o/org"), ("openai", "ft:gpt-4o/org"));
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig::default();
        let err = create_client(&config, "petstore/llama").unwrap_err();
        assert!(err.to_string().contains("petstore"));
    }

    #[test]
    #[serial]
    fn test_create_client_missing_api_key() {
        // SAFETY: serialized test, no concurrent env access
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }

        let config = LlmConfig::default();
        let err = create_client(&config, "openai/gpt-4o-mini").unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_create_client_with_api_key() {
        // SAFETY: serialized test, no concurrent env access
        unsafe {
            std::env::set_var("OPENAI_API_KEY", "test-key");
        }

        let config = LlmConfig::default();
        let client = create_client(&config, "gpt-4o-mini");

        // SAFETY: serialized test, no concurrent env access
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }

        assert!(client.is_ok());
    }
}
