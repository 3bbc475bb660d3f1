//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::base::{Completion, CompletionProvider, Message, ProviderError, ProviderResult};

/// Chat completions request format
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completions response format
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

/// Client for an OpenAI-compatible chat completions endpoint
pub struct OpenAiClient {
    client: Client,
    api_base: String,
    api_key: String,
    default_model: String,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .http1_only() // Avoids HTTP/2 issues with some proxy gateways
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    fn parse_response(&self, response: ChatCompletionResponse) -> ProviderResult<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        let text = choice.message.content.ok_or_else(|| {
            ProviderError::InvalidResponse("Choice has no message content".to_string())
        })?;

        let mut usage = HashMap::new();
        usage.insert("prompt_tokens".to_string(), response.usage.prompt_tokens);
        usage.insert(
            "completion_tokens".to_string(),
            response.usage.completion_tokens,
        );
        usage.insert("total_tokens".to_string(), response.usage.total_tokens);

        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
        max_tokens: u32,
        temperature: f64,
    ) -> ProviderResult<Completion> {
        let model = model.unwrap_or_else(|| self.default_model.clone());
        let request = ChatCompletionRequest {
            model: model.clone(),
            messages,
            max_tokens,
            temperature,
        };

        let url = format!("{}/chat/completions", self.api_base);
        debug!("Sending completion request to {} with model {}", url, model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response_data: ChatCompletionResponse = response.json().await?;
        let completion = self.parse_response(response_data)?;

        debug!(
            "Completion finished, usage: prompt={} completion={} total={}",
            completion.usage.get("prompt_tokens").unwrap_or(&0),
            completion.usage.get("completion_tokens").unwrap_or(&0),
            completion.usage.get("total_tokens").unwrap_or(&0),
        );

        Ok(completion)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> OpenAiClient {
        OpenAiClient::new("sk-test", server.url(), "gpt-5.1-mini")
    }

    #[tokio::test]
    async fn test_complete_parses_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(
                r#"{
                    "choices": [{"message": {"role": "assistant", "content": "  hello there  "}}],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
                }"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let completion = client
            .complete(vec![Message::user("hi")], None, 600, 0.7)
            .await
            .unwrap();

        // Whitespace is preserved here; trimming is the relay's job.
        assert_eq!(completion.text, "  hello there  ");
        assert_eq!(completion.usage["total_tokens"], 16);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_sends_model_and_sampling_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 600,
                "temperature": 0.7,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "ok"}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .complete(vec![Message::user("hi")], Some("gpt-4o".to_string()), 600, 0.7)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "rate limited"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .complete(vec![Message::user("hi")], None, 600, 0.7)
            .await
            .unwrap_err();

        match err {
            ProviderError::Api(msg) => assert!(msg.contains("429")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .complete(vec![Message::user("hi")], None, 600, 0.7)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_api_base_trailing_slash_is_stripped() {
        let client = OpenAiClient::new("k", "https://api.openai.com/v1/", "m");
        assert_eq!(client.api_base, "https://api.openai.com/v1");
    }
}
