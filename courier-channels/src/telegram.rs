//! Telegram channel integration

use crate::base::{sender_allowed, ChannelError, ChannelHandler, Result};
use async_trait::async_trait;
use courier_core::bus::{InboundMessage, OutboundMessage};
use courier_core::config::TelegramConfig;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction, ParseMode};
use teloxide::utils::command::BotCommands;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const HELP_TEXT: &str = "<b>courier commands</b>\n\n\
/start — Show the welcome message\n\
/reset — Clear conversation history\n\
/help — Show this help message\n\n\
Just send me a text message to chat!";

/// Telegram bot commands
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "courier commands:")]
enum Command {
    #[command(description = "Show the welcome message")]
    Start,
    #[command(description = "Clear conversation history")]
    Reset,
    #[command(description = "Show this help message")]
    Help,
}

type TypingTasks = Arc<Mutex<HashMap<i64, JoinHandle<()>>>>;

/// Telegram channel handler (long polling)
pub struct TelegramHandler {
    name: String,
    token: String,
    allow_from: Vec<String>,
    /// Static reply to /start
    greeting: Arc<String>,
    bot: Option<Bot>,
    running: bool,
    inbound_tx: Option<mpsc::UnboundedSender<InboundMessage>>,
    dispatcher_handle: Option<JoinHandle<()>>,
    typing_tasks: TypingTasks,
}

impl TelegramHandler {
    /// Create a new Telegram handler from config
    pub fn new(config: &TelegramConfig, greeting: impl Into<String>) -> Self {
        Self {
            name: "telegram".to_string(),
            token: config.token.clone(),
            allow_from: config.allow_from.clone(),
            greeting: Arc::new(greeting.into()),
            bot: None,
            running: false,
            inbound_tx: None,
            dispatcher_handle: None,
            typing_tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Convert model markdown to Telegram HTML
    ///
    /// Telegram's HTML parse mode rejects unescaped angle brackets, so code
    /// spans are stashed behind placeholders, everything else is escaped,
    /// and the spans are restored wrapped in code tags.
    fn markdown_to_telegram_html(text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut result = text.to_string();

        let mut code_blocks: Vec<String> = Vec::new();
        let code_block_re = Regex::new(r"```[\w]*\n?([\s\S]*?)```").unwrap();
        result = code_block_re
            .replace_all(&result, |caps: &regex::Captures| {
                code_blocks.push(caps[1].to_string());
                format!("\u{1}B{}\u{1}", code_blocks.len() - 1)
            })
            .to_string();

        let mut inline_codes: Vec<String> = Vec::new();
        let inline_code_re = Regex::new(r"`([^`]+)`").unwrap();
        result = inline_code_re
            .replace_all(&result, |caps: &regex::Captures| {
                inline_codes.push(caps[1].to_string());
                format!("\u{1}I{}\u{1}", inline_codes.len() - 1)
            })
            .to_string();

        result = escape_html(&result);

        let link_re = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap();
        result = link_re
            .replace_all(&result, r#"<a href="$2">$1</a>"#)
            .to_string();

        let bold_re = Regex::new(r"\*\*(.+?)\*\*").unwrap();
        result = bold_re.replace_all(&result, "<b>$1</b>").to_string();

        let italic_re = Regex::new(r"_([^_]+)_").unwrap();
        result = italic_re.replace_all(&result, "<i>$1</i>").to_string();

        for (i, code) in inline_codes.iter().enumerate() {
            result = result.replace(
                &format!("\u{1}I{}\u{1}", i),
                &format!("<code>{}</code>", escape_html(code)),
            );
        }
        for (i, code) in code_blocks.iter().enumerate() {
            result = result.replace(
                &format!("\u{1}B{}\u{1}", i),
                &format!("<pre><code>{}</code></pre>", escape_html(code)),
            );
        }

        result
    }

    async fn stop_typing(&self, chat_id: i64) {
        let mut tasks = self.typing_tasks.lock().await;
        if let Some(handle) = tasks.remove(&chat_id) {
            handle.abort();
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Compound sender ID: numeric ID, plus the username when present
fn sender_id_for(user: &teloxide::types::User) -> String {
    match &user.username {
        Some(username) => format!("{}|{}", user.id.0, username),
        None => user.id.0.to_string(),
    }
}

/// Keep the typing indicator alive for a chat until the reply is sent
async fn start_typing(typing_tasks: &TypingTasks, bot: Bot, chat_id: i64) {
    let mut tasks = typing_tasks.lock().await;
    if let Some(old) = tasks.remove(&chat_id) {
        old.abort();
    }

    let handle = tokio::spawn(async move {
        loop {
            let _ = bot.send_chat_action(ChatId(chat_id), ChatAction::Typing).await;
            // Telegram shows the indicator for ~5 seconds per action
            tokio::time::sleep(tokio::time::Duration::from_secs(4)).await;
        }
    });
    tasks.insert(chat_id, handle);
}

#[async_trait]
impl ChannelHandler for TelegramHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn start(&mut self) -> Result<()> {
        if self.token.is_empty() {
            return Err(ChannelError::NotConfigured(
                "Telegram token not configured".to_string(),
            ));
        }

        if self.running {
            return Ok(());
        }

        tracing::info!("Starting Telegram bot (polling mode)...");

        let bot = Bot::new(self.token.clone());

        let commands = vec![
            BotCommand::new("start", "Show the welcome message"),
            BotCommand::new("reset", "Clear conversation history"),
            BotCommand::new("help", "Show available commands"),
        ];
        if let Err(e) = bot.set_my_commands(commands).await {
            tracing::warn!("Failed to set bot commands: {}", e);
        }

        match bot.get_me().await {
            Ok(me) => {
                let username = me.username.clone().unwrap_or_else(|| "unknown".to_string());
                tracing::info!("Telegram bot @{} connected", username);
            }
            Err(e) => {
                return Err(ChannelError::ApiError(format!(
                    "Failed to get bot info: {}",
                    e
                )));
            }
        }

        self.bot = Some(bot.clone());
        self.running = true;

        let inbound_tx = self.inbound_tx.clone();
        let inbound_tx_cmd = self.inbound_tx.clone();
        let typing_tasks = self.typing_tasks.clone();
        let typing_tasks_cmd = self.typing_tasks.clone();
        let allow_from = self.allow_from.clone();
        let allow_from_cmd = self.allow_from.clone();
        let greeting = self.greeting.clone();
        let name = Arc::new(self.name.clone());
        let name_cmd = name.clone();

        let handler = dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                        let inbound_tx = inbound_tx_cmd.clone();
                        let typing_tasks = typing_tasks_cmd.clone();
                        let allow_from = allow_from_cmd.clone();
                        let greeting = greeting.clone();
                        let name = name_cmd.clone();

                        async move {
                            match cmd {
                                Command::Start => {
                                    if let Err(e) =
                                        bot.send_message(msg.chat.id, greeting.as_str()).await
                                    {
                                        tracing::error!("Error handling /start: {}", e);
                                    }
                                }
                                Command::Help => {
                                    if let Err(e) = bot
                                        .send_message(msg.chat.id, HELP_TEXT)
                                        .parse_mode(ParseMode::Html)
                                        .await
                                    {
                                        tracing::error!("Error handling /help: {}", e);
                                    }
                                }
                                Command::Reset => {
                                    // The relay loop owns the history; route the
                                    // command through the bus like a normal message.
                                    let Some(user) = msg.from.clone() else {
                                        return Ok(());
                                    };
                                    let sender_id = sender_id_for(&user);
                                    if !sender_allowed(&allow_from, &sender_id) {
                                        return Ok(());
                                    }

                                    start_typing(&typing_tasks, bot.clone(), msg.chat.id.0).await;

                                    if let Some(tx) = &inbound_tx {
                                        let inbound = InboundMessage::new(
                                            name.as_ref().clone(),
                                            sender_id,
                                            msg.chat.id.0.to_string(),
                                            "/reset",
                                        );
                                        if let Err(e) = tx.send(inbound) {
                                            tracing::error!(
                                                "Failed to forward /reset: {}",
                                                e
                                            );
                                        }
                                    }
                                }
                            }
                            Ok::<(), teloxide::RequestError>(())
                        }
                    }),
            )
            .branch(
                Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
                    let inbound_tx = inbound_tx.clone();
                    let typing_tasks = typing_tasks.clone();
                    let allow_from = allow_from.clone();
                    let name = name.clone();

                    async move {
                        let Some(user) = msg.from.clone() else {
                            return Ok(());
                        };

                        let sender_id = sender_id_for(&user);
                        if !sender_allowed(&allow_from, &sender_id) {
                            tracing::warn!(
                                "Access denied for sender {} on channel {}",
                                sender_id,
                                name
                            );
                            return Ok(());
                        }

                        let Some(content) = msg
                            .text()
                            .map(|t| t.to_string())
                            .or_else(|| msg.caption().map(|c| c.to_string()))
                        else {
                            return Ok(());
                        };

                        start_typing(&typing_tasks, bot.clone(), msg.chat.id.0).await;

                        if let Some(tx) = &inbound_tx {
                            let inbound = InboundMessage::new(
                                name.as_ref().clone(),
                                sender_id,
                                msg.chat.id.0.to_string(),
                                content,
                            )
                            .with_metadata("message_id", msg.id.0)
                            .with_metadata("user_id", user.id.0 as i64)
                            .with_metadata("first_name", user.first_name.clone());

                            if let Err(e) = tx.send(inbound) {
                                tracing::error!("Failed to send inbound message: {}", e);
                            }
                        }

                        Ok::<(), teloxide::RequestError>(())
                    }
                }),
            );

        let dispatcher_handle = tokio::spawn(async move {
            Dispatcher::builder(bot, handler)
                .enable_ctrlc_handler()
                .build()
                .dispatch()
                .await;
        });

        self.dispatcher_handle = Some(dispatcher_handle);

        tracing::info!("Telegram bot started");

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("Stopping Telegram bot...");

        let mut tasks = self.typing_tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        drop(tasks);

        if let Some(handle) = self.dispatcher_handle.take() {
            handle.abort();
        }

        self.bot = None;
        self.running = false;

        tracing::info!("Telegram bot stopped");

        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let bot = self
            .bot
            .as_ref()
            .ok_or_else(|| ChannelError::NotRunning("Telegram bot not running".to_string()))?;

        let chat_id: i64 = message
            .chat_id
            .parse()
            .map_err(|_| ChannelError::Error(format!("Invalid chat_id: {}", message.chat_id)))?;

        self.stop_typing(chat_id).await;

        let html_content = Self::markdown_to_telegram_html(&message.content);

        match bot
            .send_message(ChatId(chat_id), html_content)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                // Fallback to plain text
                tracing::warn!("HTML parse failed, falling back to plain text: {}", e);
                bot.send_message(ChatId(chat_id), &message.content)
                    .await
                    .map_err(|e2| {
                        ChannelError::ApiError(format!("Failed to send message: {}", e2))
                    })?;
                Ok(())
            }
        }
    }

    fn set_inbound_sender(&mut self, tx: mpsc::UnboundedSender<InboundMessage>) {
        self.inbound_tx = Some(tx);
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        sender_allowed(&self.allow_from, sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_bold() {
        let output = TelegramHandler::markdown_to_telegram_html("Hello **world**");
        assert!(output.contains("<b>world</b>"));
    }

    #[test]
    fn test_markdown_italic() {
        let output = TelegramHandler::markdown_to_telegram_html("Hello _world_");
        assert!(output.contains("<i>world</i>"));
    }

    #[test]
    fn test_markdown_inline_code() {
        let output = TelegramHandler::markdown_to_telegram_html("Use `let x = 1;` here");
        assert!(output.contains("<code>let x = 1;</code>"));
    }

    #[test]
    fn test_markdown_code_block_escapes_contents() {
        let output =
            TelegramHandler::markdown_to_telegram_html("```rust\nlet v: Vec<u8> = vec![];\n```");
        assert!(output.contains("<pre><code>"));
        assert!(output.contains("Vec&lt;u8&gt;"));
    }

    #[test]
    fn test_markdown_link() {
        let output = TelegramHandler::markdown_to_telegram_html("[docs](https://example.com)");
        assert!(output.contains(r#"<a href="https://example.com">docs</a>"#));
    }

    #[test]
    fn test_markdown_escapes_html() {
        let output = TelegramHandler::markdown_to_telegram_html("<script>alert(1)</script>");
        assert!(!output.contains("<script>"));
        assert!(output.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_handler_starts_stopped() {
        let config = TelegramConfig {
            token: "test-token".to_string(),
            allow_from: vec!["user1".to_string()],
            proxy: None,
        };

        let handler = TelegramHandler::new(&config, "welcome");
        assert_eq!(handler.name(), "telegram");
        assert!(!handler.is_running());
        assert!(handler.is_allowed("user1"));
        assert!(handler.is_allowed("99|user1"));
        assert!(!handler.is_allowed("other"));
    }
}
