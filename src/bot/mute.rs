// src/bot/mute.rs - Applies restrictions and notifies affected users

use chrono::{Duration, Utc};
use log::{debug, warn};
use std::sync::Arc;

use crate::error::BotError;
use crate::platforms::ChatApi;
use crate::types::{ChatId, InlineButton, UserId, UserProfile};

/// Until-date used for join-time offenses. Any far-future date reads as
/// an indefinite restriction on the platform side.
pub const PERMANENT_MUTE_HOURS: i64 = 876_000;

/// Requests send-restrictions from the platform and best-effort notifies
/// the affected user. Platform rejections are logged no-ops, never
/// retried or rolled back.
pub struct MuteEnforcer {
    api: Arc<dyn ChatApi>,
    update_channel: String,
    bot_username: String,
}

impl MuteEnforcer {
    pub fn new(api: Arc<dyn ChatApi>, update_channel: String, bot_username: String) -> Self {
        Self { api, update_channel, bot_username }
    }

    /// Restrict the user from sending messages for `hours` from now.
    /// Returns false on any platform error.
    pub async fn mute(&self, chat_id: ChatId, user_id: UserId, hours: i64) -> bool {
        let until = Utc::now() + Duration::hours(hours);
        match self.api.restrict_member(chat_id, user_id, until).await {
            Ok(()) => true,
            Err(e) => {
                let failure = BotError::PlatformAction { chat_id, message: e.to_string() };
                warn!("Restrict of user {} failed: {}", user_id, failure);
                false
            }
        }
    }

    /// Keyboard attached to mute notices: update channel plus a deep link
    /// back to the bot for unmute requests.
    pub fn notice_keyboard(&self) -> Vec<Vec<InlineButton>> {
        vec![
            vec![InlineButton::url(
                "🔄 Update Channel",
                format!("https://t.me/{}", self.update_channel),
            )],
            vec![InlineButton::url(
                format!("🔓 Unmute – @{}", self.bot_username),
                format!("https://t.me/{}", self.bot_username),
            )],
        ]
    }

    pub fn notice_text(user: &UserProfile, reason: &str) -> String {
        format!("⚔️ *Bio mute*\n👤 {} (`{}`)\n⛔ {}", user.first_name, user.id, reason)
    }

    /// Fire-and-forget direct message to the muted user. Failure usually
    /// means the user never started the bot or blocked it.
    pub async fn notify(&self, user: &UserProfile, reason: &str) {
        let text = Self::notice_text(user, reason);
        if let Err(e) = self
            .api
            .send_keyboard(user.id, &text, &self.notice_keyboard())
            .await
        {
            debug!("Mute notice to user {} not delivered: {}", user.id, e);
        }
    }
}
