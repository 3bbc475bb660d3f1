//! Channel manager

use crate::base::{ChannelError, ChannelHandler, ChannelHandlerPtr, Result};
use crate::telegram::TelegramHandler;
use courier_core::bus::MessageBus;
use courier_core::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coordinates channel handlers and wires them to the message bus
pub struct ChannelManager {
    config: Config,
    handlers: RwLock<HashMap<String, ChannelHandlerPtr>>,
    bus: MessageBus,
}

impl ChannelManager {
    /// Create a new channel manager
    pub fn new(config: Config, bus: MessageBus) -> Self {
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Build handlers for all configured channels
    pub async fn initialize(&self) -> Result<()> {
        let mut handlers = self.handlers.write().await;

        if !self.config.channels.telegram.token.is_empty() {
            let mut handler = TelegramHandler::new(
                &self.config.channels.telegram,
                self.config.agent.greeting.clone(),
            );
            handler.set_inbound_sender(self.bus.inbound_sender());
            handlers.insert(
                "telegram".to_string(),
                Arc::new(RwLock::new(handler)) as ChannelHandlerPtr,
            );
            tracing::info!("Telegram channel initialized");
        }

        if handlers.is_empty() {
            return Err(ChannelError::NotConfigured(
                "No channels configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Start all handlers and subscribe them to outbound delivery
    pub async fn start_all(&self) -> Result<()> {
        let handlers = self.handlers.read().await;

        for (name, handler) in handlers.iter() {
            handler.write().await.start().await?;

            let delivery_handler = handler.clone();
            let channel_name = name.clone();
            self.bus
                .subscribe_outbound(name.clone(), move |msg| {
                    let handler = delivery_handler.clone();
                    let channel_name = channel_name.clone();
                    async move {
                        if let Err(e) = handler.read().await.send(msg).await {
                            tracing::error!("Failed to deliver reply on {}: {}", channel_name, e);
                        }
                    }
                })
                .await;

            tracing::info!("Channel {} started", name);
        }

        Ok(())
    }

    /// Stop all handlers
    pub async fn stop_all(&self) {
        let handlers = self.handlers.read().await;
        for (name, handler) in handlers.iter() {
            if let Err(e) = handler.write().await.stop().await {
                tracing::warn!("Failed to stop channel {}: {}", name, e);
            }
        }
    }

    /// Names of initialized channels
    pub async fn channel_names(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_without_channels_fails() {
        let manager = ChannelManager::new(Config::default(), MessageBus::new());
        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_initialize_with_telegram_token() {
        let mut config = Config::default();
        config.channels.telegram.token = "test-token".to_string();

        let manager = ChannelManager::new(config, MessageBus::new());
        manager.initialize().await.unwrap();

        assert_eq!(manager.channel_names().await, vec!["telegram".to_string()]);
    }
}
