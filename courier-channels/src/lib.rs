//! Chat platform integrations for courier

pub mod base;
pub mod manager;
pub mod telegram;

pub use base::{ChannelError, ChannelHandler, ChannelHandlerPtr};
pub use manager::ChannelManager;
pub use telegram::TelegramHandler;
