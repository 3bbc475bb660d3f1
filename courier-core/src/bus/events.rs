//! Event types for the message bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message received from a chat channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel identifier (e.g., "telegram")
    pub channel: String,
    /// User identifier
    pub sender_id: String,
    /// Chat identifier (reply target)
    pub chat_id: String,
    /// Message text content
    pub content: String,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
    /// Channel-specific metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// History key for this conversation.
    ///
    /// Keyed by chat rather than sender so direct chats get per-user history
    /// and group chats share one thread.
    pub fn user_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Add metadata to the message
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Message to send to a chat channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Channel identifier
    pub channel: String,
    /// Target chat identifier
    pub chat_id: String,
    /// Message text content
    pub content: String,
}

impl OutboundMessage {
    /// Create a new outbound message
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }

    /// Build the reply to an inbound message
    pub fn reply_to(inbound: &InboundMessage, content: impl Into<String>) -> Self {
        Self::new(inbound.channel.clone(), inbound.chat_id.clone(), content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_combines_channel_and_chat() {
        let msg = InboundMessage::new("telegram", "42", "1001", "hello");
        assert_eq!(msg.user_key(), "telegram:1001");
    }

    #[test]
    fn test_reply_to_targets_origin_chat() {
        let inbound = InboundMessage::new("telegram", "42", "1001", "hello");
        let reply = OutboundMessage::reply_to(&inbound, "hi");
        assert_eq!(reply.channel, "telegram");
        assert_eq!(reply.chat_id, "1001");
        assert_eq!(reply.content, "hi");
    }
}
