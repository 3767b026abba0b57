//! Anthropic Claude API client implementation
//!
//! Implements the LlmClient trait for Anthropic's Messages API with
//! support for both blocking and streaming responses.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{LlmClient, LlmError, ProviderRequest, ProviderResponse, StreamChunk, TokenUsage, error_for_status};
use crate::config::LlmConfig;

/// Anthropic Claude API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.anthropic_api_key_env).map_err(|_| {
            LlmError::Auth(format!(
                "API key not found. Set the {} environment variable.",
                config.anthropic_api_key_env
            ))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build the request body for the Anthropic Messages API
    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        debug!(%request.model, %request.max_tokens, stream, "build_request_body: called");
        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": [
                {
                    "role": "user",
                    "content": request.content,
                },
            ],
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        body
    }
}

/// Parse the Anthropic API response
fn parse_response(api_response: AnthropicResponse) -> Result<ProviderResponse, LlmError> {
    let mut text = String::new();
    for block in api_response.content {
        let AnthropicContentBlock::Text { text: block_text } = block;
        text.push_str(&block_text);
    }

    Ok(ProviderResponse {
        id: api_response.id,
        model: api_response.model,
        text,
        usage: TokenUsage::new(api_response.usage.input_tokens, api_response.usage.output_tokens),
    })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, LlmError> {
        debug!(%request.model, %request.max_tokens, "complete: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(request, false);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        debug!("complete: success");
        let api_response: AnthropicResponse = response.json().await?;
        parse_response(api_response)
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ProviderResponse, LlmError> {
        debug!(%request.model, %request.max_tokens, "stream: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(request, true);

        let http_request = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to open event stream: {e}")))?;

        let mut id = String::new();
        let mut model = String::new();
        let mut full_content = String::new();
        let mut usage = TokenUsage::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Message(msg)) => {
                    let data: serde_json::Value = serde_json::from_str(&msg.data).map_err(LlmError::Json)?;

                    match data["type"].as_str() {
                        Some("message_start") => {
                            debug!("stream: message_start");
                            let message = &data["message"];
                            if let Some(msg_id) = message["id"].as_str() {
                                id = msg_id.to_string();
                            }
                            if let Some(msg_model) = message["model"].as_str() {
                                model = msg_model.to_string();
                            }
                            if let Some(u) = message.get("usage") {
                                usage.prompt_tokens = u["input_tokens"].as_u64().unwrap_or(0);
                            }
                        }
                        Some("content_block_delta") => {
                            if let Some(delta) = data.get("delta")
                                && let Some(text) = delta["text"].as_str()
                            {
                                full_content.push_str(text);
                                let _ = chunk_tx.send(StreamChunk::TextDelta(text.to_string())).await;
                            }
                        }
                        Some("message_delta") => {
                            debug!("stream: message_delta");
                            if let Some(u) = data.get("usage") {
                                usage.completion_tokens = u["output_tokens"].as_u64().unwrap_or(0);
                            }
                        }
                        Some("message_stop") => {
                            debug!("stream: message_stop");
                            break;
                        }
                        _ => {
                            debug!("stream: ignoring event type");
                        }
                    }
                }
                Ok(Event::Open) => {
                    debug!("stream: Event::Open");
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("stream: stream ended");
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let err = error_for_status(response).await;
                    debug!(status = status.as_u16(), "stream: error status");
                    let _ = chunk_tx.send(StreamChunk::Error(err.to_string())).await;
                    return Err(err);
                }
                Err(e) => {
                    debug!(%e, "stream: event error");
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(LlmError::InvalidResponse(e.to_string()));
                }
            }
        }

        usage = TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);

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

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> AnthropicClient {
        AnthropicClient {
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let request = ProviderRequest {
            model: "claude-sonnet-4".to_string(),
            content: "File: a.py\nx = 1".to_string(),
            system_prompt: "You are helpful".to_string(),
            max_tokens: 1000,
        };

        let body = test_client().build_request_body(&request, false);

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "File: a.py\nx = 1");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_build_request_body_stream_flag() {
        let request = ProviderRequest {
            model: "claude-sonnet-4".to_string(),
            content: "content".to_string(),
            system_prompt: "system".to_string(),
            max_tokens: 64,
        };

        let body = test_client().build_request_body(&request, true);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_response_concatenates_text_blocks() {
        let api: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4",
                "content": [
                    {"type": "text", "text": "part one "},
                    {"type": "text", "text": "part two"}
                ],
                "usage": {"input_tokens": 30, "output_tokens": 12}
            }"#,
        )
        .unwrap();

        let response = parse_response(api).unwrap();
        assert_eq!(response.id, "msg_01");
        assert_eq!(response.text, "part one part two");
        assert_eq!(response.usage.prompt_tokens, 30);
        assert_eq!(response.usage.total_tokens, 42);
    }
}
