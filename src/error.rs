// src/error.rs - Failure taxonomy for moderation and broadcast paths

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ChatId;

/// Every failure category gets a distinct outcome instead of silent
/// continuation. Delivery and platform-action failures are recovered
/// locally; storage failures are fatal for the affected operation.
#[derive(Debug, Error)]
pub enum BotError {
    /// Broadcast target unreachable or blocked; the target is pruned.
    #[error("delivery to chat {0} failed")]
    Delivery(ChatId),

    /// Restrict/delete call rejected by the platform (insufficient
    /// privilege, user already left). Recovered as a logged no-op.
    #[error("platform rejected action in chat {chat_id}: {message}")]
    PlatformAction { chat_id: ChatId, message: String },

    /// Non-owner invoked an owner-only command.
    #[error("command is restricted to the bot owner")]
    OwnerOnly,

    /// Malformed command argument; the string is the usage reply.
    #[error("{0}")]
    Usage(&'static str),

    /// Durable store unreadable or corrupt. Never papered over with a
    /// fabricated zero count.
    #[error("storage failure at {path}: {message}")]
    Storage { path: PathBuf, message: String },
}

impl BotError {
    pub fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        BotError::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
