// src/config/mod.rs - Environment-driven runtime configuration

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tokio::time::Duration;

use crate::bot::broadcast::BroadcastSettings;
use crate::types::UserId;

/// Everything the bot needs at startup. All values come from the
/// environment (a .env file is honored); only the identity fields are
/// mandatory.
#[derive(Debug, Clone)]
pub struct Config {
    pub owner_id: UserId,
    pub bot_username: String,
    pub update_channel: String,
    pub data_dir: PathBuf,
    /// Standing mute duration applied by the warning ladder, in hours.
    pub mute_duration_hours: i64,
    pub broadcast_max_in_flight: usize,
    pub broadcast_pace_ms: u64,
    pub broadcast_target_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let owner_id = env::var("OWNER_ID")
            .context("OWNER_ID environment variable not set")?
            .parse()
            .context("OWNER_ID must be a numeric user id")?;

        let bot_username =
            env::var("BOT_USERNAME").context("BOT_USERNAME environment variable not set")?;

        let update_channel =
            env::var("UPDATE_CHANNEL").context("UPDATE_CHANNEL environment variable not set")?;

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let mute_duration_hours = Self::numeric_var("MUTE_DURATION_HOURS", 2)?;
        let broadcast_max_in_flight = Self::numeric_var("BROADCAST_MAX_IN_FLIGHT", 4)?;
        let broadcast_pace_ms = Self::numeric_var("BROADCAST_PACE_MS", 50)?;
        let broadcast_target_timeout_secs = Self::numeric_var("BROADCAST_TARGET_TIMEOUT", 10)?;

        Ok(Self {
            owner_id,
            bot_username,
            update_channel,
            data_dir,
            mute_duration_hours,
            broadcast_max_in_flight,
            broadcast_pace_ms,
            broadcast_target_timeout_secs,
        })
    }

    fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
        match env::var(name) {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be numeric, got {:?}", name, raw)),
            Err(_) => Ok(default),
        }
    }

    pub fn warns_path(&self) -> PathBuf {
        self.data_dir.join("warns.json")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            max_in_flight: self.broadcast_max_in_flight,
            pace: Duration::from_millis(self.broadcast_pace_ms),
            per_target_timeout: Duration::from_secs(self.broadcast_target_timeout_secs),
        }
    }

    #[cfg(test)]
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            owner_id: 1000,
            bot_username: "warden_bot".into(),
            update_channel: "updates".into(),
            data_dir: data_dir.to_path_buf(),
            mute_duration_hours: 2,
            broadcast_max_in_flight: 4,
            broadcast_pace_ms: 0,
            broadcast_target_timeout_secs: 1,
        }
    }
}
