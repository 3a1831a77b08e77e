use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::types::{ChatEvent, ChatId, InlineButton, MemberStatus, MessageId, UserId};

pub mod telegram;

/// Outbound platform operations the moderation core depends on. The
/// Telegram client implements this; tests substitute a recording mock.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send a Markdown-formatted text message.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    /// Send a text message with an inline keyboard attached.
    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &[Vec<InlineButton>],
    ) -> Result<MessageId>;

    /// Replace the text of a previously sent message.
    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()>;

    /// Acknowledge a callback-button press.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<MessageId>;

    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Restrict the user from sending messages until the given instant.
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<()>;

    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    /// Membership of a public channel, addressed by @username.
    async fn channel_member_status(&self, channel: &str, user_id: UserId)
        -> Result<MemberStatus>;

    /// Profile biography, if the user has one.
    async fn user_bio(&self, user_id: UserId) -> Result<Option<String>>;
}

/// Inbound side of a platform transport: connect, then consume events
/// from the broadcast channel.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<ChatEvent>>;
    async fn is_connected(&self) -> bool;
    async fn disconnect(&mut self) -> Result<()>;
}
