use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};
use verbtab_core::{ChatMessage, Error, LLMResponse, Result};

use crate::client::build_http_client;
use crate::Provider;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        proxy: Option<&str>,
    ) -> Self {
        let api_base = api_base
            .unwrap_or(ANTHROPIC_API_BASE)
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

    /// Anthropic takes the system prompt as a top-level field and requires
    /// strictly alternating user/assistant turns.
    fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_text: Option<String> = None;
        let mut turns: Vec<(String, String)> = Vec::new();

        for msg in messages {
            if msg.role == "system" {
                system_text = Some(match system_text {
                    Some(existing) => format!("{}\n\n{}", existing, msg.content),
                    None => msg.content.clone(),
                });
                continue;
            }
            let role = if msg.role == "assistant" { "assistant" } else { "user" };
            match turns.last_mut() {
                Some((last_role, text)) if last_role == role => {
                    text.push_str("\n\n");
                    text.push_str(&msg.content);
                }
                _ => turns.push((role.to_string(), msg.content.clone())),
            }
        }

        let converted = turns
            .into_iter()
            .map(|(role, content)| serde_json::json!({ "role": role, "content": content }))
            .collect();
        (system_text, converted)
    }

    /// Config may store "anthropic/claude-..." but the API expects the bare model id.
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("anthropic/").unwrap_or(model)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse> {
        let url = format!("{}/messages", self.api_base);
        let model = Self::normalize_model(&self.model);
        let (system, turns) = Self::convert_messages(messages);

        let mut request = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": turns,
        });
        if let Some(sys) = system {
            request["system"] = Value::String(sys);
        }

        info!(url = %url, model = %model, messages_count = messages.len(), "Calling Anthropic API");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Anthropic API error");
            return Err(Error::Provider(format!("Anthropic API error {}: {}", status, raw_body)));
        }

        debug!(body_len = raw_body.len(), "Anthropic raw response");
        parse_response(&raw_body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_response(raw_body: &str) -> Result<LLMResponse> {
    let resp: AnthropicResponse = serde_json::from_str(raw_body).map_err(|e| {
        let mut end = raw_body.len().min(500);
        while !raw_body.is_char_boundary(end) {
            end -= 1;
        }
        Error::Provider(format!("Failed to parse Anthropic response: {}. Body: {}", e, &raw_body[..end]))
    })?;

    let text: Vec<&str> = resp
        .content
        .iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect();

    let finish_reason = match resp.stop_reason.as_deref() {
        Some("end_turn") | None => "stop".to_string(),
        Some("max_tokens") => "length".to_string(),
        Some(other) => other.to_string(),
    };

    Ok(LLMResponse {
        content: if text.is_empty() { None } else { Some(text.join("\n")) },
        finish_reason,
        usage: serde_json::json!({
            "prompt_tokens": resp.usage.as_ref().and_then(|u| u.input_tokens),
            "completion_tokens": resp.usage.as_ref().and_then(|u| u.output_tokens),
        }),
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}
