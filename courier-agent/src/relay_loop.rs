//! Inbound message processing loop

use crate::relay::ChatRelay;
use courier_core::bus::{MessageBus, OutboundMessage};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Acknowledgement sent after a /reset command
pub const RESET_REPLY: &str = "Conversation history cleared. Let's start fresh!";

/// Consumes inbound messages from the bus and publishes relay replies
pub struct RelayLoop {
    bus: MessageBus,
    relay: Arc<ChatRelay>,
}

impl RelayLoop {
    /// Create a new relay loop
    pub fn new(bus: MessageBus, relay: Arc<ChatRelay>) -> Self {
        Self { bus, relay }
    }

    /// Run until the inbound queue closes
    ///
    /// Each message is handled in its own task; ordering for a single user
    /// is preserved by the relay's per-user locks.
    pub async fn run(&self) {
        let mut inbound_rx = match self.bus.take_inbound_receiver().await {
            Some(rx) => rx,
            None => {
                warn!("Inbound receiver already taken");
                return;
            }
        };

        info!("Relay loop started");

        while let Some(msg) = inbound_rx.recv().await {
            let relay = self.relay.clone();
            let bus = self.bus.clone();

            tokio::spawn(async move {
                let user_key = msg.user_key();
                let reply = if msg.content.trim() == "/reset" {
                    relay.reset(&user_key).await;
                    RESET_REPLY.to_string()
                } else {
                    relay.respond(&user_key, &msg.content).await
                };

                if let Err(e) = bus.publish_outbound(OutboundMessage::reply_to(&msg, reply)) {
                    error!("Failed to publish reply for {}: {}", user_key, e);
                }
            });
        }

        info!("Relay loop stopped");
    }
}
