// src/types/mod.rs - Core types that flow through the moderation pipeline

use serde::{Deserialize, Serialize};

/// Platform-assigned user identifier.
pub type UserId = i64;
/// Platform-assigned chat identifier (groups are negative on Telegram).
pub type ChatId = i64;
/// Message identifier, unique within a chat.
pub type MessageId = i64;

/// Chat flavor as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Moderation only applies to group-style chats.
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}

/// Inbound chat message after wire decoding.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub chat: ChatRef,
    pub sender: UserProfile,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo_file_id: Option<String>,
    pub reply_to: Option<Box<IncomingMessage>>,
}

impl IncomingMessage {
    /// Message body used for link scanning and broadcast sourcing.
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or("")
    }
}

/// Events delivered by the platform transport.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(IncomingMessage),
    MembersJoined { chat: ChatRef, members: Vec<UserProfile> },
    CallbackQuery {
        id: String,
        from: UserProfile,
        data: String,
        /// Chat and message the pressed button was attached to.
        origin: Option<(ChatId, MessageId)>,
    },
}

/// Membership status of a user within a chat or channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    /// Creators and administrators are exempt from moderation.
    pub fn is_privileged(&self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }

    /// Counts as "joined" for the update-channel gate.
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            MemberStatus::Creator | MemberStatus::Administrator | MemberStatus::Member
        )
    }
}

/// Outcome of running a message through the warning ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationDecision {
    Allow,
    Warn(u32),
    MuteAndReset { reason: String },
}

/// Inline keyboard button attached to outbound messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineButton {
    Url { text: String, url: String },
    Callback { text: String, data: String },
}

impl InlineButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        InlineButton::Url { text: text.into(), url: url.into() }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        InlineButton::Callback { text: text.into(), data: data.into() }
    }
}

/// What an owner broadcast carries to every target.
#[derive(Debug, Clone)]
pub enum BroadcastContent {
    Text(String),
    Photo { file_id: String, caption: Option<String> },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastOptions {
    pub to_users: bool,
    pub pin_in_groups: bool,
}

/// Tally returned after a broadcast run completes or is cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned_groups: usize,
    pub pruned_users: usize,
    pub cancelled: bool,
}
