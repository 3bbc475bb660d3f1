//! Configuration management

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use schema::{AgentConfig, Config, LoggingConfig, OpenAiConfig, TelegramConfig};
