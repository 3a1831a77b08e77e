//! # Linkwarden
//!
//! An anti-link moderation bot for Telegram-style group chats: link spam
//! in messages or profile bios walks offenders up a warning ladder into a
//! temporary mute, join-time offenders are muted on sight, and the bot
//! owner can broadcast to every group and user the bot has ever seen.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let warns = Arc::new(WarnStore::load(config.warns_path()).await?);
//!     let registry = Arc::new(Registry::load(config.registry_path()).await?);
//!
//!     let mut connection = TelegramConnection::new(TelegramConfig::from_env()?);
//!     connection.connect().await?;
//!     let events = connection.get_event_receiver().expect("connected");
//!
//!     let api: Arc<dyn ChatApi> = Arc::new(connection);
//!     let bot = Arc::new(WardenBot::new(api, warns, registry, &config)?);
//!     bot.run(events).await;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod platforms;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::WardenBot;
    pub use crate::config::Config;
    pub use crate::error::BotError;
    pub use crate::platforms::{
        telegram::{TelegramConfig, TelegramConnection},
        ChatApi, EventSource,
    };
    pub use crate::storage::{Registry, WarnStore};
    pub use crate::types::{
        BroadcastContent, BroadcastOptions, BroadcastReport, ChatEvent, IncomingMessage,
        ModerationDecision,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
