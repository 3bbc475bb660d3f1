//! Bounded per-user conversation buffers

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Speaker role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire-format role tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One exchanged message, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// In-memory store of per-user conversation history
///
/// Each user key maps to an ordered buffer holding at most `capacity` turns;
/// appending beyond capacity evicts the oldest turn. Buffers are created
/// lazily on first append and live for the process lifetime. All operations
/// are infallible.
///
/// The store is plain shared state with no per-user ordering guarantees of
/// its own; callers that need read-then-append atomicity for one user must
/// serialize those calls (the relay holds a per-user lock).
pub struct HistoryStore {
    capacity: usize,
    buffers: RwLock<HashMap<String, VecDeque<Turn>>>,
}

impl HistoryStore {
    /// Create a store retaining at most `capacity` turns per user
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Maximum turns retained per user
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current turns for a user, oldest first; empty if the user is unknown
    pub async fn snapshot(&self, user_key: &str) -> Vec<Turn> {
        let buffers = self.buffers.read().await;
        buffers
            .get(user_key)
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append one turn, evicting from the front once over capacity
    pub async fn append(&self, user_key: &str, turn: Turn) {
        let mut buffers = self.buffers.write().await;
        let buf = buffers
            .entry(user_key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        buf.push_back(turn);
        while buf.len() > self.capacity {
            buf.pop_front();
        }
    }

    /// Drop a user's buffer entirely
    pub async fn clear(&self, user_key: &str) {
        self.buffers.write().await.remove(user_key);
    }

    /// Number of turns currently stored for a user
    pub async fn len(&self, user_key: &str) -> usize {
        let buffers = self.buffers.read().await;
        buffers.get(user_key).map(VecDeque::len).unwrap_or(0)
    }
}
