use verbtab_core::config::ProviderConfig;
use verbtab_core::Config;

use crate::{AnthropicProvider, OpenAIProvider, Provider};

/// Default api_base for OpenAI-compatible providers.
fn default_api_base(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Infer the provider from a model id prefix. `None` when the prefix is unknown.
pub fn infer_provider_from_model(model: &str) -> Option<&'static str> {
    if model.starts_with("anthropic/") || model.starts_with("claude-") {
        Some("anthropic")
    } else if model.starts_with("openai/")
        || model.starts_with("gpt-")
        || model.starts_with("o1")
        || model.starts_with("o3")
    {
        Some("openai")
    } else if model.starts_with("deepseek") {
        Some("deepseek")
    } else {
        None
    }
}

/// Create a provider for `model`.
///
/// Resolution order: `explicit_provider`, then the model prefix, then the
/// first provider in the config that has an API key.
pub fn create_provider(
    config: &Config,
    model: &str,
    explicit_provider: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let effective_provider: &str = if let Some(ep) = explicit_provider {
        ep
    } else if let Some(inferred) = infer_provider_from_model(model) {
        inferred
    } else if let Some(fallback) = config.first_configured_provider() {
        fallback
    } else {
        return Err(anyhow::anyhow!(
            "No planner provider configured. Set planner.provider, use a recognized model prefix \
             (e.g. 'anthropic/claude-...', 'gpt-4o'), or add an API key to the providers section."
        ));
    };

    let empty_cfg = ProviderConfig::default();
    let provider_cfg = config.get_provider(effective_provider).unwrap_or(&empty_cfg);
    if provider_cfg.api_key.is_empty() {
        return Err(anyhow::anyhow!(
            "Provider '{}' has no API key",
            effective_provider
        ));
    }

    let max_tokens = config.planner.max_tokens;
    let temperature = config.planner.temperature;
    let proxy = provider_cfg.proxy.as_deref();

    match effective_provider {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(
            &provider_cfg.api_key,
            provider_cfg.api_base.as_deref(),
            model,
            max_tokens,
            temperature,
            proxy,
        ))),
        _ => {
            let api_base = provider_cfg
                .api_base
                .as_deref()
                .unwrap_or_else(|| default_api_base(effective_provider));
            Ok(Box::new(OpenAIProvider::new(
                &provider_cfg.api_key,
                Some(api_base),
                model,
                max_tokens,
                temperature,
                proxy,
            )))
        }
    }
}

/// Provider for the planner section of the config.
pub fn create_planner_provider(config: &Config) -> anyhow::Result<Box<dyn Provider>> {
    if !config.planner.enabled {
        return Err(anyhow::anyhow!("Planner disabled in config (planner.enabled = false)"));
    }
    create_provider(config, &config.planner.model, config.planner.provider.as_deref())
}
