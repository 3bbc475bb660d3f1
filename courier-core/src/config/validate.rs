//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
///
/// Missing secrets are fatal here so the process refuses to start before
/// serving any traffic.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.channels.telegram.token.trim().is_empty() {
        errors.push(
            "channels.telegram.token is required (set TG_TOKEN or config.json)".to_string(),
        );
    }
    if config.providers.openai.api_key.trim().is_empty() {
        errors.push(
            "providers.openai.api_key is required (set OPENAI_API_KEY or config.json)".to_string(),
        );
    }

    if config.agent.model.trim().is_empty() {
        errors.push("agent.model must not be empty".to_string());
    }
    if config.agent.max_tokens == 0 {
        errors.push("agent.max_tokens must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&config.agent.temperature) {
        errors.push("agent.temperature must be in [0.0, 2.0]".to_string());
    }
    if config.agent.history_limit == 0 {
        errors.push("agent.history_limit must be > 0".to_string());
    }
    if config.agent.system_prompt.trim().is_empty() {
        errors.push("agent.system_prompt must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
