pub mod anthropic;
pub mod client;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use verbtab_core::{ChatMessage, LLMResponse, Result};

/// A chat-completion backend used by the planner.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse>;

    /// Model identifier, for logs and diagnostics.
    fn model(&self) -> &str;
}

pub use anthropic::AnthropicProvider;
pub use factory::{create_planner_provider, create_provider, infer_provider_from_model};
pub use openai::OpenAIProvider;
