//! Request, response, and streaming types shared across providers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider or reconstructed locally.
///
/// `total_tokens` is always `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total_tokens == self.prompt_tokens + self.completion_tokens
    }
}

/// A single-attempt request handed to a provider client.
///
/// `model` is the bare provider-side name; provider routing has already
/// happened by the time a client sees this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub model: String,
    pub content: String,
    pub system_prompt: String,
    pub max_tokens: u32,
}

/// What a provider client returns before orchestration wraps it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Provider-assigned id; empty when the provider sent none
    pub id: String,

    /// Provider-reported model name
    pub model: String,

    /// Generated text
    pub text: String,

    /// Provider-reported usage; zeroed when the provider sent none
    pub usage: TokenUsage,
}

/// Chunks delivered over a streaming channel, in emission order.
///
/// A stream is a finite sequence of `TextDelta`s terminated by exactly one
/// `Done`; `Error` ends a stream early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    TextDelta(String),
    Done { usage: TokenUsage },
    Error(String),
}

/// An orchestrator-level query: the full `provider/model` id plus the
/// prompt fields that determine the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub model: String,
    pub content: String,
    pub system_prompt: String,
    pub max_tokens: u32,
}

/// Structured result of one query.
///
/// Immutable once constructed: readers get accessors, and the only way to
/// change metadata is [`LLMResponse::with_meta`], which produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    id: String,
    response: String,
    metadata: BTreeMap<String, serde_json::Value>,
    usage: TokenUsage,
}

impl LLMResponse {
    pub fn new(
        id: impl Into<String>,
        response: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
        usage: TokenUsage,
    ) -> Self {
        Self {
            id: id.into(),
            response: response.into(),
            metadata,
            usage,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Whether this response was served from the cache
    pub fn cache_hit(&self) -> bool {
        self.metadata
            .get("cache_hit")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Produce a new response with one metadata entry replaced or added
    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}
