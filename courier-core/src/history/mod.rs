//! Per-user bounded conversation history

pub mod store;

pub use store::{HistoryStore, Role, Turn};
