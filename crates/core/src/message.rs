use serde::{Deserialize, Serialize};

/// A single chat turn exchanged with a planner provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub finish_reason: String,
    pub usage: serde_json::Value,
}

impl Default for LLMResponse {
    fn default() -> Self {
        Self {
            content: None,
            finish_reason: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}

impl LLMResponse {
    /// Text content, empty when the provider returned none.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}
