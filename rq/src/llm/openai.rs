//! OpenAI API client implementation
//!
//! Implements the LlmClient trait for OpenAI's Chat Completions API with
//! support for both blocking and streaming responses.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{LlmClient, LlmError, ProviderRequest, ProviderResponse, StreamChunk, TokenUsage, error_for_status};
use crate::config::LlmConfig;

/// OpenAI API client
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAIClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.openai_api_key_env).map_err(|_| {
            LlmError::Auth(format!(
                "API key not found. Set the {} environment variable.",
                config.openai_api_key_env
            ))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build the request body for the OpenAI API
    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        debug!(%request.model, %request.max_tokens, stream, "build_request_body: called");

        let messages = serde_json::json!([
            {
                "role": "system",
                "content": request.system_prompt,
            },
            {
                "role": "user",
                "content": request.content,
            },
        ]);

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens = request.model.starts_with("gpt-5")
            || request.model.starts_with("o1")
            || request.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        if stream {
            body["stream"] = serde_json::json!(true);
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }

        body
    }
}

/// Parse the OpenAI API response
fn parse_response(api_response: OpenAIResponse) -> Result<ProviderResponse, LlmError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

    Ok(ProviderResponse {
        id: api_response.id,
        model: api_response.model,
        text: choice.message.content.unwrap_or_default(),
        usage: TokenUsage::new(api_response.usage.prompt_tokens, api_response.usage.completion_tokens),
    })
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        debug!(%request.model, %request.max_tokens, "complete: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(request, false);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        debug!("complete: success");
        let api_response: OpenAIResponse = response.json().await?;
        parse_response(api_response)
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ProviderResponse, LlmError> {
        debug!(%request.model, %request.max_tokens, "stream: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(request, true);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let mut stream = response.bytes_stream();
        let mut id = String::new();
        let mut model = String::new();
        let mut full_content = String::new();
        let mut usage = TokenUsage::default();
        let mut buffer = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(LlmError::Network(e));
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete SSE lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }

                if let Some(data) = line.strip_prefix("data: ")
                    && let Ok(chunk_data) = serde_json::from_str::<OpenAIStreamChunk>(data)
                {
                    if let Some(chunk_id) = chunk_data.id {
                        id = chunk_id;
                    }
                    if let Some(chunk_model) = chunk_data.model {
                        model = chunk_model;
                    }

                    if let Some(choice) = chunk_data.choices.first()
                        && let Some(content) = &choice.delta.content
                    {
                        full_content.push_str(content);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(content.clone())).await;
                    }

                    // Usage arrives in the final chunk when stream_options is set
                    if let Some(u) = chunk_data.usage {
                        usage = TokenUsage::new(u.prompt_tokens, u.completion_tokens);
                    }
                }
            }
        }

        debug!("stream: complete");
        let _ = chunk_tx.send(StreamChunk::Done { usage }).await;

        Ok(ProviderResponse {
            id,
            model,
            text: full_content,
            usage,
        })
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// Streaming types

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}
