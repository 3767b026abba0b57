//! Provider client trait

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{LlmError, ProviderRequest, ProviderResponse, StreamChunk};

/// A single-attempt LLM provider client.
///
/// Implementations translate one request into one provider call. Retry,
/// caching, and token-limit policy live above this trait in the query
/// engine, so a client either returns the provider's answer or the error
/// for exactly one attempt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request and wait for the full response
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError>;

    /// Send a completion request, delivering chunks over `chunk_tx` as they
    /// arrive, and return the assembled response at the end
    async fn stream(
        &self,
        request: &ProviderRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ProviderResponse, LlmError>;
}

impl fmt::Debug for dyn LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn LlmClient")
    }
}
