// src/bot/commands.rs - Owner and onboarding command surface

use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::broadcast::BroadcastDispatcher;
use crate::error::BotError;
use crate::platforms::ChatApi;
use crate::storage::Registry;
use crate::types::{
    BroadcastContent, BroadcastOptions, ChatId, ChatKind, IncomingMessage, InlineButton,
    MessageId, UserId, UserProfile,
};

const HELP_TEXT: &str = "🤖 *Bot Commands:*\n\n\
    /start - Start the bot\n\
    /help - Show help menu\n\
    /setmute <hours> - Set mute duration (owner only)\n\
    /status - Show bot status (owner only)\n\
    /broadcast -user - Send to users and groups\n\
    /broadcast -user -pin - Pin in groups too\n\
    /cancelbroadcast - Stop a running broadcast (owner only)\n\
    /restart - Restart bot (owner only)";

/// Parses slash commands and routes them. Owner-only commands reject
/// everyone but the configured owner with no side effects.
pub struct CommandSystem {
    api: Arc<dyn ChatApi>,
    registry: Arc<Registry>,
    broadcaster: Arc<BroadcastDispatcher>,
    mute_hours: Arc<RwLock<i64>>,
    owner_id: UserId,
    bot_username: String,
    update_channel: String,
}

impl CommandSystem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn ChatApi>,
        registry: Arc<Registry>,
        broadcaster: Arc<BroadcastDispatcher>,
        mute_hours: Arc<RwLock<i64>>,
        owner_id: UserId,
        bot_username: String,
        update_channel: String,
    ) -> Self {
        Self {
            api,
            registry,
            broadcaster,
            mute_hours,
            owner_id,
            bot_username,
            update_channel,
        }
    }

    /// Returns true when the message was a command this system handled.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<bool> {
        let text = match &message.text {
            Some(text) if text.starts_with('/') => text.clone(),
            _ => return Ok(false),
        };

        let mut parts = text.split_whitespace();
        let command = match parts.next() {
            Some(raw) => raw
                .trim_start_matches('/')
                .trim_end_matches(&format!("@{}", self.bot_username))
                .to_lowercase(),
            None => return Ok(false),
        };
        let args: Vec<&str> = parts.collect();

        let outcome = match command.as_str() {
            "start" => self.handle_start(message).await,
            "help" => self.handle_help(message.chat.id).await,
            "setmute" => self.handle_setmute(message, &args).await,
            "status" => self.handle_status(message).await,
            "broadcast" => self.handle_broadcast(message, &args).await,
            "cancelbroadcast" => self.handle_cancel(message).await,
            "restart" => self.handle_restart(message).await,
            _ => return Ok(false),
        };

        if let Err(err) = outcome {
            match &err {
                BotError::OwnerOnly => {
                    self.reply(message.chat.id, "⛔ Only the bot owner can use this command.")
                        .await;
                }
                BotError::Usage(usage) => {
                    self.reply(message.chat.id, usage).await;
                }
                other => error!("Command /{} failed: {}", command, other),
            }
        }

        Ok(true)
    }

    /// Callback-button presses; currently only the help button exists.
    pub async fn handle_callback(
        &self,
        callback_id: &str,
        from: &UserProfile,
        data: &str,
        origin: Option<(ChatId, MessageId)>,
    ) -> Result<()> {
        if let Err(e) = self.api.answer_callback(callback_id).await {
            warn!("Could not answer callback {}: {}", callback_id, e);
        }

        if data == "help" {
            match origin {
                Some((chat_id, message_id)) => {
                    self.api.edit_message(chat_id, message_id, HELP_TEXT).await?;
                }
                None => {
                    self.api.send_message(from.id, HELP_TEXT).await?;
                }
            }
        }
        Ok(())
    }

    fn require_owner(&self, message: &IncomingMessage) -> Result<(), BotError> {
        if message.sender.id == self.owner_id {
            Ok(())
        } else {
            Err(BotError::OwnerOnly)
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.api.send_message(chat_id, text).await {
            warn!("Could not reply in chat {}: {}", chat_id, e);
        }
    }

    async fn handle_start(&self, message: &IncomingMessage) -> Result<(), BotError> {
        let user = &message.sender;

        if message.chat.kind == ChatKind::Private {
            self.registry.register_user(user.id).await?;
        }

        // Update-channel gate: unknown membership counts as not joined.
        let joined = match self
            .api
            .channel_member_status(&self.update_channel, user.id)
            .await
        {
            Ok(status) => status.is_present(),
            Err(_) => false,
        };

        if !joined {
            let keyboard = vec![vec![InlineButton::url(
                "🔗 Join Channel",
                format!("https://t.me/{}", self.update_channel),
            )]];
            if let Err(e) = self
                .api
                .send_keyboard(
                    message.chat.id,
                    "🔒 Please join our update channel to use me.",
                    &keyboard,
                )
                .await
            {
                warn!("Could not send join-gate reply: {}", e);
            }
            return Ok(());
        }

        let keyboard = vec![
            vec![InlineButton::url(
                "➕ Add Me To Your Group",
                format!("https://t.me/{}?startgroup=true", self.bot_username),
            )],
            vec![InlineButton::url(
                "🔄 Update Channel",
                format!("https://t.me/{}", self.update_channel),
            )],
            vec![InlineButton::callback("ℹ️ Help", "help")],
        ];
        let welcome = format!(
            "👋 Welcome {}!\n\nI'm your anti-link bot to mute spammers with links in bio or messages.",
            user.first_name
        );
        if let Err(e) = self.api.send_keyboard(message.chat.id, &welcome, &keyboard).await {
            warn!("Could not send welcome: {}", e);
        }
        Ok(())
    }

    async fn handle_help(&self, chat_id: ChatId) -> Result<(), BotError> {
        self.reply(chat_id, HELP_TEXT).await;
        Ok(())
    }

    async fn handle_setmute(
        &self,
        message: &IncomingMessage,
        args: &[&str],
    ) -> Result<(), BotError> {
        self.require_owner(message)?;

        let hours: i64 = args
            .first()
            .and_then(|raw| raw.parse().ok())
            .filter(|hours| *hours > 0)
            .ok_or(BotError::Usage("Usage: /setmute 2"))?;

        *self.mute_hours.write().await = hours;
        info!("Standing mute duration set to {} hour(s)", hours);
        self.reply(
            message.chat.id,
            &format!("✅ Mute duration set to {} hour(s).", hours),
        )
        .await;
        Ok(())
    }

    async fn handle_status(&self, message: &IncomingMessage) -> Result<(), BotError> {
        // Matches the historical behavior: non-owners get silence, not a
        // rejection reply.
        if message.sender.id != self.owner_id {
            return Ok(());
        }

        let (groups, users) = self.registry.counts().await;
        let hours = *self.mute_hours.read().await;
        self.reply(
            message.chat.id,
            &format!(
                "📊 Status:\n👥 Groups: {}\n👤 Users: {}\n⏱ Mute Time: {} hour(s)",
                groups, users, hours
            ),
        )
        .await;
        Ok(())
    }

    async fn handle_broadcast(
        &self,
        message: &IncomingMessage,
        args: &[&str],
    ) -> Result<(), BotError> {
        self.require_owner(message)?;

        let source = message
            .reply_to
            .as_deref()
            .ok_or(BotError::Usage("Reply to the message you want to broadcast."))?;

        let content = match &source.photo_file_id {
            Some(file_id) => BroadcastContent::Photo {
                file_id: file_id.clone(),
                caption: source.caption.clone(),
            },
            None => {
                let body = source.body();
                if body.is_empty() {
                    return Err(BotError::Usage("Reply to the message you want to broadcast."));
                }
                BroadcastContent::Text(body.to_string())
            }
        };

        let options = BroadcastOptions {
            to_users: args.contains(&"-user"),
            pin_in_groups: args.contains(&"-pin"),
        };

        // The fan-out runs as its own task; the report reply follows once
        // it drains.
        let broadcaster = Arc::clone(&self.broadcaster);
        let api = Arc::clone(&self.api);
        let origin = message.chat.id;
        tokio::spawn(async move {
            let report = broadcaster.dispatch(content, options).await;
            let summary = if report.cancelled {
                format!("🛑 Broadcast cancelled after {} chats.", report.delivered)
            } else {
                format!("✅ Broadcast sent to {} chats.", report.delivered)
            };
            if let Err(e) = api.send_message(origin, &summary).await {
                warn!("Could not deliver broadcast report: {}", e);
            }
        });

        Ok(())
    }

    async fn handle_cancel(&self, message: &IncomingMessage) -> Result<(), BotError> {
        self.require_owner(message)?;
        let stopped = self.broadcaster.cancel_active().await;
        self.reply(
            message.chat.id,
            if stopped {
                "🛑 Broadcast cancellation requested."
            } else {
                "No broadcast is currently running."
            },
        )
        .await;
        Ok(())
    }

    async fn handle_restart(&self, message: &IncomingMessage) -> Result<(), BotError> {
        // Process re-exec is handled by the supervisor; this just
        // acknowledges, as non-owners get silence.
        if message.sender.id != self.owner_id {
            return Ok(());
        }
        info!("Restart requested by owner");
        self.reply(message.chat.id, "♻️ Restarting bot...").await;
        Ok(())
    }
}
