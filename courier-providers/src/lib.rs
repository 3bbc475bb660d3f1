//! Completion provider integrations for courier

pub mod base;
pub mod openai;

pub use base::{Completion, CompletionProvider, Message, ProviderError, ProviderResult};
pub use openai::OpenAiClient;
