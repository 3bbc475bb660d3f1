//! The conversation relay

use courier_core::config::AgentConfig;
use courier_core::history::{HistoryStore, Turn};
use courier_providers::{CompletionProvider, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Reply returned to the user when the completion service fails
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't generate a reply just now. Please send your message again.";

/// Converts an inbound user message plus stored history into a reply,
/// updating history as a side effect.
///
/// All provider failures collapse into [`FALLBACK_REPLY`]; history is only
/// mutated on success. Calls for the same user key are serialized with a
/// per-user lock so concurrent messages cannot interleave their
/// read-then-append sequences.
pub struct ChatRelay {
    provider: Arc<dyn CompletionProvider>,
    history: Arc<HistoryStore>,
    system_prompt: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatRelay {
    /// Create a new relay
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        history: Arc<HistoryStore>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            provider,
            history,
            system_prompt: config.system_prompt.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Assemble the provider message sequence for one completion call:
    /// system instruction, stored history, then the new user turn.
    pub async fn build_request(&self, user_key: &str, user_text: &str) -> Vec<Message> {
        let history = self.history.snapshot(user_key).await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.iter().map(Message::from));
        messages.push(Message::user(user_text));
        messages
    }

    /// Produce a reply for one inbound user message
    pub async fn respond(&self, user_key: &str, user_text: &str) -> String {
        let lock = self.user_lock(user_key).await;
        let _guard = lock.lock().await;

        let messages = self.build_request(user_key, user_text).await;
        debug!(
            user_key,
            context_len = messages.len(),
            "Requesting completion"
        );

        match self
            .provider
            .complete(
                messages,
                Some(self.model.clone()),
                self.max_tokens,
                self.temperature,
            )
            .await
        {
            Ok(completion) => {
                let reply = completion.text.trim().to_string();
                self.history.append(user_key, Turn::user(user_text)).await;
                self.history
                    .append(user_key, Turn::assistant(reply.clone()))
                    .await;
                reply
            }
            Err(err) => {
                warn!(user_key, "Completion failed: {}", err);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Forget a user's conversation history
    pub async fn reset(&self, user_key: &str) {
        let lock = self.user_lock(user_key).await;
        let _guard = lock.lock().await;
        self.history.clear(user_key).await;
    }

    async fn user_lock(&self, user_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_providers::{Completion, ProviderError, ProviderResult};
    use std::sync::Mutex as StdMutex;

    /// Provider double that records every request and replays canned replies
    struct MockProvider {
        requests: StdMutex<Vec<Vec<Message>>>,
        replies: StdMutex<Vec<ProviderResult<String>>>,
    }

    impl MockProvider {
        fn replying(reply: &str) -> Self {
            Self::with_replies(vec![Ok(reply.to_string())])
        }

        fn failing() -> Self {
            Self::with_replies(vec![Err(ProviderError::Api("boom".to_string()))])
        }

        fn with_replies(replies: Vec<ProviderResult<String>>) -> Self {
            Self {
                requests: StdMutex::new(Vec::new()),
                replies: StdMutex::new(replies),
            }
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        async fn complete(
            &self,
            messages: Vec<Message>,
            _model: Option<String>,
            _max_tokens: u32,
            _temperature: f64,
        ) -> ProviderResult<Completion> {
            self.requests.lock().unwrap().push(messages);
            let mut replies = self.replies.lock().unwrap();
            let next = if replies.is_empty() {
                Ok("ok".to_string())
            } else {
                replies.remove(0)
            };
            next.map(|text| Completion {
                text,
                usage: Default::default(),
            })
        }

        fn default_model(&self) -> String {
            "mock".to_string()
        }
    }

    fn relay_with(provider: Arc<MockProvider>, capacity: usize) -> (ChatRelay, Arc<HistoryStore>) {
        let history = Arc::new(HistoryStore::new(capacity));
        let config = AgentConfig::default();
        let relay = ChatRelay::new(provider, history.clone(), &config);
        (relay, history)
    }

    #[tokio::test]
    async fn test_fresh_user_request_is_system_plus_user() {
        let provider = Arc::new(MockProvider::replying("hi"));
        let (relay, _) = relay_with(provider.clone(), 12);

        relay.respond("u", "hello").await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][0].role, "system");
        assert_eq!(requests[0][1], Message::user("hello"));
    }

    #[tokio::test]
    async fn test_success_appends_user_then_assistant() {
        let provider = Arc::new(MockProvider::replying("  the reply  "));
        let (relay, history) = relay_with(provider, 12);

        let reply = relay.respond("u", "hello").await;
        assert_eq!(reply, "the reply");

        let turns = history.snapshot("u").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user("hello"));
        assert_eq!(turns[1], Turn::assistant("the reply"));
    }

    #[tokio::test]
    async fn test_failure_returns_fallback_and_leaves_history_untouched() {
        let provider = Arc::new(MockProvider::failing());
        let (relay, history) = relay_with(provider, 12);
        history.append("u", Turn::user("earlier")).await;
        history.append("u", Turn::assistant("before")).await;

        let reply = relay.respond("u", "hello").await;
        assert_eq!(reply, FALLBACK_REPLY);

        let turns = history.snapshot("u").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user("earlier"));
        assert_eq!(turns[1], Turn::assistant("before"));
    }

    #[tokio::test]
    async fn test_request_contains_system_history_and_new_turn() {
        let provider = Arc::new(MockProvider::replying("ok"));
        let (relay, history) = relay_with(provider.clone(), 12);
        for i in 0..4 {
            history.append("u", Turn::user(format!("m{}", i))).await;
        }

        relay.respond("u", "next").await;

        let requests = provider.requests();
        // system + 4 stored turns + new user turn
        assert_eq!(requests[0].len(), 6);
        assert_eq!(requests[0][5], Message::user("next"));
    }

    #[tokio::test]
    async fn test_history_caps_at_capacity_across_many_exchanges() {
        let replies = (1..=7).map(|i| Ok(format!("r{}", i))).collect();
        let provider = Arc::new(MockProvider::with_replies(replies));
        let (relay, history) = relay_with(provider, 12);

        for i in 1..=7 {
            relay.respond("u", &format!("m{}", i)).await;
        }

        // 14 turns appended; the earliest exchange fell off the front.
        let turns = history.snapshot("u").await;
        assert_eq!(turns.len(), 12);
        assert_eq!(turns[0], Turn::user("m2"));
        assert_eq!(turns[11], Turn::assistant("r7"));
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let provider = Arc::new(MockProvider::replying("hi"));
        let (relay, history) = relay_with(provider, 12);

        relay.respond("u", "hello").await;
        relay.reset("u").await;

        assert!(history.snapshot("u").await.is_empty());
    }

    #[tokio::test]
    async fn test_users_do_not_share_context() {
        let provider = Arc::new(MockProvider::with_replies(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
        ]));
        let (relay, _) = relay_with(provider.clone(), 12);

        relay.respond("u1", "from one").await;
        relay.respond("u2", "from two").await;

        let requests = provider.requests();
        // Second user's request carries no trace of the first conversation.
        assert_eq!(requests[1].len(), 2);
        assert_eq!(requests[1][1], Message::user("from two"));
    }
}
