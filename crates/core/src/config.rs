use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// `None` follows the environment, `Some("")` forces a direct connection.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    #[serde(default = "default_planner_enabled")]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    /// Explicit provider name. Inferred from the model prefix when absent.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Characters of page text/markup forwarded to the planner.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

fn default_planner_enabled() -> bool {
    true
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_page_chars() -> usize {
    24_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: default_planner_enabled(),
            model: default_model(),
            provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetcherBackend {
    #[default]
    Http,
    Lynx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherConfig {
    #[serde(default)]
    pub backend: FetcherBackend,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Binary used by the lynx backend.
    #[serde(default = "default_lynx_binary")]
    pub lynx_binary: String,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("verbtab/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

fn default_lynx_binary() -> String {
    "lynx".to_string()
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            backend: FetcherBackend::default(),
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            lynx_binary: default_lynx_binary(),
        }
    }
}

/// Provider names paired with the environment variable that may carry their key.
const CREDENTIAL_ENV: &[(&str, &str)] = &[
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("deepseek", "DEEPSEEK_API_KEY"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("anthropic".to_string(), ProviderConfig::default());
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert("openrouter".to_string(), ProviderConfig {
            api_base: Some("https://openrouter.ai/api/v1".to_string()),
            ..ProviderConfig::default()
        });
        providers.insert("deepseek".to_string(), ProviderConfig::default());

        Self {
            providers,
            planner: PlannerConfig::default(),
            fetcher: FetcherConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file if present, then fill missing API keys from the environment.
    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Keys already present in the file win over the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (provider, var) in CREDENTIAL_ENV {
            let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let entry = self.providers.entry(provider.to_string()).or_default();
            if entry.api_key.is_empty() {
                debug!(provider = %provider, env = %var, "API key taken from environment");
                entry.api_key = value.trim().to_string();
            }
        }
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// First provider with a usable key, in a fixed priority order.
    pub fn first_configured_provider(&self) -> Option<&str> {
        let priority = ["anthropic", "openai", "openrouter", "deepseek"];
        priority.into_iter().find(|name| {
            self.providers
                .get(*name)
                .map(|p| !p.api_key.is_empty())
                .unwrap_or(false)
        })
    }
}
