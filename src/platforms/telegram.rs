// src/platforms/telegram.rs - Thin Telegram Bot API transport

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, Duration};

use crate::platforms::{ChatApi, EventSource};
use crate::types::{
    ChatEvent, ChatId, ChatKind, ChatRef, IncomingMessage, InlineButton, MemberStatus, MessageId,
    UserId, UserProfile,
};

/// Telegram Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: MessageId,
    from: Option<WireUser>,
    chat: WireChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<WirePhotoSize>>,
    new_chat_members: Option<Vec<WireUser>>,
    reply_to_message: Option<Box<WireMessage>>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: UserId,
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: ChatId,
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct WireCallbackQuery {
    id: String,
    from: WireUser,
    data: Option<String>,
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireChatMember {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WireSentMessage {
    message_id: MessageId,
}

/// Configuration for the Telegram connection
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    /// Load Telegram configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN environment variable not set")?;

        let api_base = env::var("TELEGRAM_API_BASE")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());

        let poll_timeout_secs = env::var("TELEGRAM_POLL_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self { bot_token, api_base, poll_timeout_secs })
    }
}

/// Long-polling Telegram Bot API client. Inbound updates are decoded into
/// [`ChatEvent`]s and fanned out over a broadcast channel; outbound calls
/// go through [`ChatApi`].
pub struct TelegramConnection {
    config: TelegramConfig,
    http_client: reqwest::Client,
    event_sender: Option<broadcast::Sender<ChatEvent>>,
    is_connected: Arc<RwLock<bool>>,
}

impl TelegramConnection {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            event_sender: None,
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    fn method_url(base: &str, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", base, token, method)
    }

    async fn call<T: DeserializeOwned>(
        http_client: &reqwest::Client,
        config: &TelegramConfig,
        method: &str,
        payload: Value,
    ) -> Result<T> {
        let url = Self::method_url(&config.api_base, &config.bot_token, method);

        let response = http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach Telegram API method {}", method))?;

        let api_response: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram response for {}", method))?;

        if !api_response.ok {
            let description = api_response
                .description
                .unwrap_or_else(|| "no description".to_string());
            anyhow::bail!("Telegram API {} rejected: {}", method, description);
        }

        api_response
            .result
            .ok_or_else(|| anyhow::anyhow!("Telegram API {} returned ok without result", method))
    }

    async fn invoke<T: DeserializeOwned>(&self, method: &str, payload: Value) -> Result<T> {
        Self::call(&self.http_client, &self.config, method, payload).await
    }

    fn parse_status(status: &str) -> MemberStatus {
        match status {
            "creator" => MemberStatus::Creator,
            "administrator" => MemberStatus::Administrator,
            "member" => MemberStatus::Member,
            "restricted" => MemberStatus::Restricted,
            "kicked" => MemberStatus::Kicked,
            _ => MemberStatus::Left,
        }
    }

    fn keyboard_markup(keyboard: &[Vec<InlineButton>]) -> Value {
        let rows: Vec<Vec<Value>> = keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match button {
                        InlineButton::Url { text, url } => json!({ "text": text, "url": url }),
                        InlineButton::Callback { text, data } => {
                            json!({ "text": text, "callback_data": data })
                        }
                    })
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn convert_user(user: WireUser) -> UserProfile {
        UserProfile {
            id: user.id,
            first_name: user.first_name,
            username: user.username,
        }
    }

    fn convert_chat(chat: &WireChat) -> ChatRef {
        let kind = match chat.kind.as_str() {
            "private" => ChatKind::Private,
            "group" => ChatKind::Group,
            "supergroup" => ChatKind::Supergroup,
            _ => ChatKind::Channel,
        };
        ChatRef { id: chat.id, kind, title: chat.title.clone() }
    }

    fn convert_message(message: WireMessage) -> Option<IncomingMessage> {
        let chat = Self::convert_chat(&message.chat);
        let sender = Self::convert_user(message.from?);
        // Telegram returns photos as ascending resolutions; keep the largest.
        let photo_file_id = message
            .photo
            .and_then(|sizes| sizes.into_iter().last())
            .map(|size| size.file_id);
        let reply_to = message
            .reply_to_message
            .and_then(|reply| Self::convert_message(*reply))
            .map(Box::new);

        Some(IncomingMessage {
            id: message.message_id,
            chat,
            sender,
            text: message.text,
            caption: message.caption,
            photo_file_id,
            reply_to,
        })
    }

    fn convert_update(update: WireUpdate) -> Option<ChatEvent> {
        if let Some(callback) = update.callback_query {
            let origin = callback
                .message
                .as_ref()
                .map(|message| (message.chat.id, message.message_id));
            return Some(ChatEvent::CallbackQuery {
                id: callback.id,
                from: Self::convert_user(callback.from),
                data: callback.data.unwrap_or_default(),
                origin,
            });
        }

        let message = update.message?;
        if let Some(joined) = &message.new_chat_members {
            if !joined.is_empty() {
                let chat = Self::convert_chat(&message.chat);
                let members = message
                    .new_chat_members
                    .into_iter()
                    .flatten()
                    .map(Self::convert_user)
                    .collect();
                return Some(ChatEvent::MembersJoined { chat, members });
            }
        }

        Self::convert_message(message).map(ChatEvent::Message)
    }
}

#[async_trait]
impl EventSource for TelegramConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Telegram Bot API...");

        // getMe doubles as a token check.
        let me: WireUser = self.invoke("getMe", json!({})).await?;
        info!(
            "Authorized as @{} (id {})",
            me.username.as_deref().unwrap_or("?"),
            me.id
        );

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());
        *self.is_connected.write().await = true;

        let event_sender = tx;
        let is_connected = Arc::clone(&self.is_connected);
        let config = self.config.clone();
        let http_client = self.http_client.clone();

        tokio::spawn(async move {
            info!("Telegram update poller started");
            let base_backoff = Duration::from_secs(1);
            let mut backoff = base_backoff;
            let mut offset: i64 = 0;

            loop {
                if !*is_connected.read().await {
                    info!("Telegram connection marked as disconnected, stopping poller");
                    break;
                }

                let payload = json!({
                    "offset": offset,
                    "timeout": config.poll_timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                });

                match Self::call::<Vec<WireUpdate>>(&http_client, &config, "getUpdates", payload)
                    .await
                {
                    Ok(updates) => {
                        backoff = base_backoff;
                        debug!("Polled {} Telegram updates", updates.len());

                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(event) = Self::convert_update(update) {
                                if let Err(e) = event_sender.send(event) {
                                    warn!("Failed to broadcast Telegram event: {}", e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to poll Telegram updates: {}", e);
                        if e.to_string().contains("401") || e.to_string().contains("Unauthorized") {
                            error!("Telegram token rejected, marking as disconnected");
                            *is_connected.write().await = false;
                            break;
                        }
                        sleep(backoff).await;
                        backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                        warn!("Backing off update polling to {:?}", backoff);
                    }
                }
            }

            warn!("Telegram update poller stopped");
        });

        info!("Telegram connection established");
        Ok(())
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<ChatEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from Telegram");
        Ok(())
    }
}

#[async_trait]
impl ChatApi for TelegramConnection {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let sent: WireSentMessage = self
            .invoke(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text, "parse_mode": "Markdown" }),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &[Vec<InlineButton>],
    ) -> Result<MessageId> {
        let sent: WireSentMessage = self
            .invoke(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "reply_markup": Self::keyboard_markup(keyboard),
                }),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        // editMessageText returns the edited message; the body is unused.
        let _: Value = self
            .invoke(
                "editMessageText",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                    "parse_mode": "Markdown",
                }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: Value = self
            .invoke("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<MessageId> {
        let mut payload = json!({ "chat_id": chat_id, "photo": file_id });
        if let Some(caption) = caption {
            payload["caption"] = json!(caption);
        }
        let sent: WireSentMessage = self.invoke("sendPhoto", payload).await?;
        Ok(sent.message_id)
    }

    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let _: Value = self
            .invoke(
                "pinChatMessage",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let _: Value = self
            .invoke(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<()> {
        let _: Value = self
            .invoke(
                "restrictChatMember",
                json!({
                    "chat_id": chat_id,
                    "user_id": user_id,
                    "permissions": { "can_send_messages": false },
                    "until_date": until.timestamp(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let member: WireChatMember = self
            .invoke("getChatMember", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await?;
        Ok(Self::parse_status(&member.status))
    }

    async fn channel_member_status(
        &self,
        channel: &str,
        user_id: UserId,
    ) -> Result<MemberStatus> {
        let member: WireChatMember = self
            .invoke(
                "getChatMember",
                json!({ "chat_id": format!("@{}", channel), "user_id": user_id }),
            )
            .await?;
        Ok(Self::parse_status(&member.status))
    }

    async fn user_bio(&self, user_id: UserId) -> Result<Option<String>> {
        let chat: WireChat = self.invoke("getChat", json!({ "chat_id": user_id })).await?;
        Ok(chat.bio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_update(raw: &str) -> Option<ChatEvent> {
        let update: WireUpdate = serde_json::from_str(raw).unwrap();
        TelegramConnection::convert_update(update)
    }

    #[test]
    fn decodes_group_text_message() {
        let event = decode_update(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 44,
                    "from": {"id": 7, "first_name": "Ann", "username": "ann"},
                    "chat": {"id": -100, "type": "supergroup", "title": "Lounge"},
                    "text": "hello"
                }
            }"#,
        );

        match event {
            Some(ChatEvent::Message(msg)) => {
                assert_eq!(msg.id, 44);
                assert_eq!(msg.chat.id, -100);
                assert!(msg.chat.kind.is_group());
                assert_eq!(msg.sender.id, 7);
                assert_eq!(msg.body(), "hello");
            }
            other => panic!("expected message event, got {:?}", other),
        }
    }

    #[test]
    fn decodes_join_event() {
        let event = decode_update(
            r#"{
                "update_id": 11,
                "message": {
                    "message_id": 45,
                    "from": {"id": 7, "first_name": "Ann"},
                    "chat": {"id": -100, "type": "group"},
                    "new_chat_members": [
                        {"id": 8, "first_name": "t.me/spam"},
                        {"id": 9, "first_name": "Bob"}
                    ]
                }
            }"#,
        );

        match event {
            Some(ChatEvent::MembersJoined { chat, members }) => {
                assert_eq!(chat.id, -100);
                assert_eq!(members.len(), 2);
                assert_eq!(members[0].first_name, "t.me/spam");
            }
            other => panic!("expected join event, got {:?}", other),
        }
    }

    #[test]
    fn decodes_photo_with_reply() {
        let event = decode_update(
            r#"{
                "update_id": 12,
                "message": {
                    "message_id": 46,
                    "from": {"id": 1, "first_name": "Owner"},
                    "chat": {"id": 1, "type": "private"},
                    "text": "/broadcast -pin",
                    "reply_to_message": {
                        "message_id": 40,
                        "from": {"id": 1, "first_name": "Owner"},
                        "chat": {"id": 1, "type": "private"},
                        "caption": "new release",
                        "photo": [
                            {"file_id": "small"},
                            {"file_id": "large"}
                        ]
                    }
                }
            }"#,
        );

        match event {
            Some(ChatEvent::Message(msg)) => {
                let reply = msg.reply_to.expect("reply present");
                assert_eq!(reply.photo_file_id.as_deref(), Some("large"));
                assert_eq!(reply.caption.as_deref(), Some("new release"));
            }
            other => panic!("expected message event, got {:?}", other),
        }
    }

    #[test]
    fn decodes_callback_with_origin() {
        let event = decode_update(
            r#"{
                "update_id": 14,
                "callback_query": {
                    "id": "cb1",
                    "from": {"id": 7, "first_name": "Ann"},
                    "data": "help",
                    "message": {
                        "message_id": 33,
                        "chat": {"id": 7, "type": "private"},
                        "text": "welcome"
                    }
                }
            }"#,
        );

        match event {
            Some(ChatEvent::CallbackQuery { data, origin, .. }) => {
                assert_eq!(data, "help");
                assert_eq!(origin, Some((7, 33)));
            }
            other => panic!("expected callback event, got {:?}", other),
        }
    }

    #[test]
    fn drops_channel_posts_without_sender() {
        let event = decode_update(
            r#"{
                "update_id": 13,
                "message": {
                    "message_id": 47,
                    "chat": {"id": -200, "type": "channel"},
                    "text": "announcement"
                }
            }"#,
        );
        assert!(event.is_none());
    }
}
