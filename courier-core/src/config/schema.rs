//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for courier
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent (relay) configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Channel configuration
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Provider configuration
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier sent to the completion provider
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum reply length in tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Number of conversation turns kept per user
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// System instruction prepended to every completion request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Static reply to the /start command
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_model() -> String {
    "gpt-5.1-mini".to_string()
}

fn default_max_tokens() -> u32 {
    600
}

fn default_temperature() -> f64 {
    0.7
}

fn default_history_limit() -> usize {
    12
}

fn default_system_prompt() -> String {
    "You are a concise, helpful assistant. Answer directly, \
     ask a clarifying question only when the request is ambiguous."
        .to_string()
}

fn default_greeting() -> String {
    "Hi! I'm an AI assistant. Send me a message and I'll reply. \
     Use /reset to start the conversation over."
        .to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_limit: default_history_limit(),
            system_prompt: default_system_prompt(),
            greeting: default_greeting(),
        }
    }
}

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// Allowed sender IDs or usernames (empty = allow all)
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_contract() {
        let config = Config::default();
        assert_eq!(config.agent.model, "gpt-5.1-mini");
        assert_eq!(config.agent.max_tokens, 600);
        assert!((config.agent.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.agent.history_limit, 12);
        assert!(!config.agent.system_prompt.is_empty());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent":{"model":"gpt-4o-mini"}}"#).unwrap();
        assert_eq!(config.agent.model, "gpt-4o-mini");
        assert_eq!(config.agent.max_tokens, 600);
        assert_eq!(config.providers.openai.api_base, "https://api.openai.com/v1");
    }
}
