use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::broadcast::BroadcastDispatcher;
use crate::bot::commands::CommandSystem;
use crate::bot::join_guard::JoinGuard;
use crate::bot::moderation::Moderator;
use crate::bot::mute::MuteEnforcer;
use crate::config::Config;
use crate::platforms::ChatApi;
use crate::storage::{Registry, WarnStore};
use crate::types::ChatEvent;

pub mod broadcast;
pub mod commands;
pub mod join_guard;
pub mod moderation;
pub mod mute;

/// Core engine wiring the moderation pipeline, join screening, command
/// surface and broadcast fan-out over one platform connection.
pub struct WardenBot {
    registry: Arc<Registry>,
    moderator: Moderator,
    join_guard: JoinGuard,
    commands: CommandSystem,
}

impl WardenBot {
    pub fn new(
        api: Arc<dyn ChatApi>,
        warns: Arc<WarnStore>,
        registry: Arc<Registry>,
        config: &Config,
    ) -> Result<Self> {
        let mute_hours = Arc::new(RwLock::new(config.mute_duration_hours));

        let enforcer = || {
            MuteEnforcer::new(
                Arc::clone(&api),
                config.update_channel.clone(),
                config.bot_username.clone(),
            )
        };

        let moderator = Moderator::new(
            Arc::clone(&warns),
            Arc::clone(&mute_hours),
            Arc::clone(&api),
            enforcer(),
        )?;

        let join_guard = JoinGuard::new(enforcer())?;

        let broadcaster = Arc::new(BroadcastDispatcher::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            config.broadcast_settings(),
        ));

        let commands = CommandSystem::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            broadcaster,
            mute_hours,
            config.owner_id,
            config.bot_username.clone(),
            config.update_channel.clone(),
        );

        Ok(Self { registry, moderator, join_guard, commands })
    }

    /// Route a single platform event through the right subsystem.
    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => {
                // Any in-group activity makes the group a broadcast target.
                if message.chat.kind.is_group() {
                    if let Err(e) = self.registry.register_group(message.chat.id).await {
                        error!("Could not track group {}: {}", message.chat.id, e);
                    }
                }

                match self.commands.handle_message(&message).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => {
                        error!("Command handling failed: {}", e);
                        return;
                    }
                }

                if let Err(e) = self.moderator.handle_message(&message).await {
                    error!("Moderation failed for message {}: {}", message.id, e);
                }
            }
            ChatEvent::MembersJoined { chat, members } => {
                if let Err(e) = self.registry.register_group(chat.id).await {
                    error!("Could not track group {}: {}", chat.id, e);
                }
                if let Err(e) = self.join_guard.handle_join(&chat, &members).await {
                    error!("Join screening failed in chat {}: {}", chat.id, e);
                }
            }
            ChatEvent::CallbackQuery { id, from, data, origin } => {
                if let Err(e) = self.commands.handle_callback(&id, &from, &data, origin).await {
                    error!("Callback handling failed: {}", e);
                }
            }
        }
    }

    /// Consume events until the transport closes. Each event is handled
    /// in its own task so a slow handler never holds up the stream.
    pub async fn run(self: Arc<Self>, mut receiver: tokio::sync::broadcast::Receiver<ChatEvent>) {
        info!("Event dispatcher started");
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let bot = Arc::clone(&self);
                    tokio::spawn(async move {
                        bot.handle_event(event).await;
                    });
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Event stream closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockApi;
    use crate::types::{ChatKind, ChatRef, IncomingMessage, UserProfile};

    async fn bot_fixture() -> (Arc<MockApi>, WardenBot, Arc<Registry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(MockApi::new());
        let api_dyn: Arc<dyn ChatApi> = Arc::clone(&api) as Arc<dyn ChatApi>;
        let warns = Arc::new(WarnStore::load(dir.path().join("warns.json")).await.unwrap());
        let registry = Arc::new(Registry::load(dir.path().join("registry.json")).await.unwrap());
        let config = Config::for_tests(dir.path());
        let bot = WardenBot::new(api_dyn, warns, Arc::clone(&registry), &config).unwrap();
        (api, bot, registry, dir)
    }

    fn group_text(chat_id: i64, user_id: i64, text: &str) -> ChatEvent {
        ChatEvent::Message(IncomingMessage {
            id: 1,
            chat: ChatRef { id: chat_id, kind: ChatKind::Group, title: None },
            sender: UserProfile { id: user_id, first_name: "Ann".into(), username: None },
            text: Some(text.into()),
            caption: None,
            photo_file_id: None,
            reply_to: None,
        })
    }

    #[tokio::test]
    async fn group_activity_registers_the_group() {
        let (_api, bot, registry, _dir) = bot_fixture().await;
        bot.handle_event(group_text(-42, 7, "hello there")).await;
        assert_eq!(registry.groups().await, vec![-42]);
    }

    #[tokio::test]
    async fn spam_message_is_moderated_through_dispatch() {
        let (api, bot, _registry, _dir) = bot_fixture().await;
        bot.handle_event(group_text(-42, 7, "buy at http://spam.example")).await;

        assert_eq!(api.deleted.lock().unwrap().len(), 1);
        assert!(api.sent_to(-42)[0].contains("Warning 1/3"));
    }

    #[tokio::test]
    async fn join_event_screens_members() {
        let (api, bot, registry, _dir) = bot_fixture().await;
        bot.handle_event(ChatEvent::MembersJoined {
            chat: ChatRef { id: -42, kind: ChatKind::Group, title: None },
            members: vec![UserProfile {
                id: 8,
                first_name: "t.me/spamchannel".into(),
                username: None,
            }],
        })
        .await;

        assert_eq!(api.restricted.lock().unwrap().len(), 1);
        assert_eq!(registry.groups().await, vec![-42]);
    }

    #[tokio::test]
    async fn commands_short_circuit_moderation() {
        let (api, bot, _registry, _dir) = bot_fixture().await;
        // A /help command containing a link must not be treated as spam.
        bot.handle_event(group_text(-42, 7, "/help")).await;

        assert!(api.deleted.lock().unwrap().is_empty());
        assert!(api.sent_to(-42)[0].contains("Bot Commands"));
    }
}
