//! Query orchestration: cache lookup, retry with backoff, response assembly
//!
//! Sits between the pipeline and the single-attempt provider clients. A
//! query runs `cache lookup → provider call (with retry) → cache write`;
//! a streaming query skips the cache on the read path and leaves the write
//! to the caller via [`QueryEngine::store`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    LlmClient, LlmError, LLMResponse, ProviderRequest, ProviderResponse, QueryRequest, StreamChunk, TokenUsage,
    split_model,
};
use crate::cache::{QueryCache, request_key};
use crate::config::LlmConfig;
use crate::tokens::TokenCounter;

/// Retry and admission policy for a [`QueryEngine`]
#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    /// Retries after the first attempt, so `max_retries = 3` allows 4 calls
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Largest bundle (in tokens) the engine will submit
    pub token_limit: usize,
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            token_limit: 128_000,
        }
    }
}

impl From<&LlmConfig> for QueryEngineConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            token_limit: config.token_limit,
        }
    }
}

/// Orchestrates queries against one provider client
pub struct QueryEngine {
    client: Arc<dyn LlmClient>,
    cache: Arc<QueryCache>,
    counter: Arc<TokenCounter>,
    config: QueryEngineConfig,
}

impl QueryEngine {
    pub fn new(
        client: Arc<dyn LlmClient>,
        cache: Arc<QueryCache>,
        counter: Arc<TokenCounter>,
        config: QueryEngineConfig,
    ) -> Self {
        Self {
            client,
            cache,
            counter,
            config,
        }
    }

    /// Run one query to completion.
    ///
    /// A repeated request (same model, content, system prompt, max tokens)
    /// is served from the cache with `metadata.cache_hit = true` and a fresh
    /// request id; the stored payload is returned unchanged otherwise.
    pub async fn query(&self, request: &QueryRequest) -> Result<LLMResponse, LlmError> {
        debug!(%request.model, content_len = request.content.len(), "query: called");
        self.check_token_limit(request)?;

        let key = request_key(request);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%key, "query: cache hit");
            return Ok(cached
                .with_meta("cache_hit", json!(true))
                .with_meta("cache_backend", json!(self.cache.backend()))
                .with_meta("request_id", json!(Uuid::now_v7().to_string())));
        }

        debug!(%key, "query: cache miss, calling provider");
        let provider_response = self.call_with_retry(&self.provider_request(request)).await?;
        if provider_response.text.is_empty() {
            return Err(LlmError::InvalidResponse("provider returned an empty response".to_string()));
        }

        let response = self.wrap_response(request, provider_response);
        self.cache.put(&key, &response).await;
        Ok(response)
    }

    /// Run one streaming query, delivering chunks over `chunk_tx`.
    ///
    /// The cache is not consulted and not written: the returned value is the
    /// folded response, and a caller who wants it cached calls
    /// [`QueryEngine::store`] after collecting the chunks. Streaming makes a
    /// single provider attempt; there is no way to replay text the caller
    /// has already seen, so a mid-stream failure surfaces instead of
    /// retrying.
    pub async fn query_stream(
        &self,
        request: &QueryRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<LLMResponse, LlmError> {
        debug!(%request.model, content_len = request.content.len(), "query_stream: called");
        self.check_token_limit(request)?;

        let mut provider_response = self.client.stream(&self.provider_request(request), chunk_tx).await?;
        if provider_response.text.is_empty() {
            return Err(LlmError::InvalidResponse("stream produced no text".to_string()));
        }

        // Some providers omit usage on streamed responses; count locally
        // rather than reporting zero
        if provider_response.usage.total_tokens == 0 {
            provider_response.usage = TokenUsage::new(
                self.counter.count(&request.content) as u64,
                self.counter.count(&provider_response.text) as u64,
            );
            debug!(
                total = provider_response.usage.total_tokens,
                "query_stream: provider omitted usage, counted locally"
            );
        }

        Ok(self.wrap_response(request, provider_response))
    }

    /// Write a folded streaming response back to the cache
    pub async fn store(&self, request: &QueryRequest, response: &LLMResponse) {
        let key = request_key(request);
        debug!(%key, "store: caching folded response");
        self.cache.put(&key, response).await;
    }

    /// The configured submission ceiling, in tokens
    pub fn token_limit(&self) -> usize {
        self.config.token_limit
    }

    fn check_token_limit(&self, request: &QueryRequest) -> Result<(), LlmError> {
        let total = self.counter.count(&request.content);
        if total > self.config.token_limit {
            warn!(total, limit = self.config.token_limit, "query rejected: content over token limit");
            return Err(LlmError::TokenLimitExceeded {
                total,
                limit: self.config.token_limit,
            });
        }
        Ok(())
    }

    fn provider_request(&self, request: &QueryRequest) -> ProviderRequest {
        let (_, model) = split_model(&request.model);
        ProviderRequest {
            model: model.to_string(),
            content: request.content.clone(),
            system_prompt: request.system_prompt.clone(),
            max_tokens: request.max_tokens,
        }
    }

    fn wrap_response(&self, request: &QueryRequest, provider: ProviderResponse) -> LLMResponse {
        let id = if provider.id.is_empty() {
            Uuid::now_v7().to_string()
        } else {
            provider.id
        };

        LLMResponse::new(id, provider.text, Default::default(), provider.usage)
            .with_meta("model", json!(request.model))
            .with_meta("cache_hit", json!(false))
            .with_meta("cache_backend", json!(self.cache.backend()))
            .with_meta("request_id", json!(Uuid::now_v7().to_string()))
    }

    /// Call the provider, retrying transient failures with exponential
    /// backoff until `max_retries` is exhausted
    async fn call_with_retry(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.client.complete(request).await {
                Ok(response) => {
                    debug!(attempt, "call_with_retry: success");
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(attempt, %error, "call_with_retry: fatal error");
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, %error, "call_with_retry: retries exhausted");
                return Err(LlmError::Unavailable {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.backoff_delay(attempt, error.retry_after());
            warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "provider call failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// `initial_backoff_ms * 2^(attempt-1)` plus up to 25% jitter; a
    /// server-supplied retry-after takes precedence
    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after;
        }

        let base = self
            .config
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let jitter = rand::rng().random_range(0..=base / 4);
        Duration::from_millis(base.saturating_add(jitter))
    }
}
