use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};
use verbtab_core::{ChatMessage, Error, LLMResponse, Result};

use crate::client::build_http_client;
use crate::Provider;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Any OpenAI-compatible `/chat/completions` endpoint (OpenAI, OpenRouter, DeepSeek, vLLM...).
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        proxy: Option<&str>,
    ) -> Self {
        let api_base = api_base
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/')
            .to_string();
        Self {
            client: build_http_client(proxy, &api_base, Duration::from_secs(120)),
            api_key: api_key.to_string(),
            api_base,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    /// Strip routing prefixes ("openai/gpt-4o") that only the config understands.
    /// OpenRouter model ids keep their vendor prefix.
    fn normalize_model<'a>(&self, model: &'a str) -> &'a str {
        if self.api_base.contains("openrouter.ai") {
            return model;
        }
        model.strip_prefix("openai/").unwrap_or(model)
    }

    fn build_request(&self, messages: &[ChatMessage]) -> Value {
        serde_json::json!({
            "model": self.normalize_model(&self.model),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": messages,
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(messages);

        info!(url = %url, model = %self.model, messages_count = messages.len(), "Calling chat completions API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Chat completions request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Chat completions API error");
            return Err(Error::Provider(format!("API error {}: {}", status, raw_body)));
        }

        debug!(body_len = raw_body.len(), "Chat completions raw response");
        parse_response(&raw_body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_response(raw_body: &str) -> Result<LLMResponse> {
    let chat_response: ChatResponse = serde_json::from_str(raw_body)
        .map_err(|e| Error::Provider(format!("Failed to parse chat completions response: {}", e)))?;

    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    Ok(LLMResponse {
        content: if content.is_empty() { None } else { Some(content) },
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        usage: chat_response.usage.unwrap_or(Value::Null),
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
