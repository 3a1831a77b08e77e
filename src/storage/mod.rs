// src/storage/mod.rs - Durable warn counters and broadcast target registry

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::BotError;
use crate::types::{ChatId, UserId};

/// Loads a JSON state file, treating a missing or empty file as the
/// default state. A present-but-unparsable file is a storage failure
/// surfaced to the caller, never silently replaced.
async fn load_state<T: DeserializeOwned + Default>(path: &Path) -> Result<T, BotError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(T::default()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| BotError::storage(path, format!("corrupt state file: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(BotError::storage(path, e)),
    }
}

/// Writes the serialized state to a sibling temp file and renames it into
/// place, so a crash mid-write never leaves a truncated file behind.
async fn persist_state<T: Serialize>(path: &Path, state: &T) -> Result<(), BotError> {
    let bytes = serde_json::to_vec(state).map_err(|e| BotError::storage(path, e))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| BotError::storage(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| BotError::storage(path, e))
}

/// Durable per-user violation counter. Read-modify-write sequences run
/// under the store lock and are persisted before the new count is
/// returned, so concurrent violations by the same user serialize.
pub struct WarnStore {
    path: PathBuf,
    counts: Mutex<BTreeMap<UserId, u32>>,
}

impl WarnStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, BotError> {
        let path = path.into();
        let counts: BTreeMap<UserId, u32> = load_state(&path).await?;
        info!("Warn store loaded from {} ({} users tracked)", path.display(), counts.len());
        Ok(Self { path, counts: Mutex::new(counts) })
    }

    /// Adds one violation for the user and returns the new count.
    pub async fn increment(&self, user_id: UserId) -> Result<u32, BotError> {
        let mut counts = self.counts.lock().await;
        let entry = counts.entry(user_id).or_insert(0);
        *entry += 1;
        let new_count = *entry;
        persist_state(&self.path, &*counts).await?;
        debug!("Warn count for {} is now {}", user_id, new_count);
        Ok(new_count)
    }

    /// Clears the user's counter back to zero.
    pub async fn reset(&self, user_id: UserId) -> Result<(), BotError> {
        let mut counts = self.counts.lock().await;
        counts.insert(user_id, 0);
        persist_state(&self.path, &*counts).await
    }

    pub async fn count(&self, user_id: UserId) -> u32 {
        *self.counts.lock().await.get(&user_id).unwrap_or(&0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    users: BTreeSet<UserId>,
    groups: BTreeSet<ChatId>,
}

/// Durable deduplicated sets of every user and group the bot has seen.
/// Groups are registered on any in-group activity, users on a private
/// /start; entries only leave through broadcast pruning.
pub struct Registry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, BotError> {
        let path = path.into();
        let state: RegistryState = load_state(&path).await?;
        info!(
            "Registry loaded from {} ({} groups, {} users)",
            path.display(),
            state.groups.len(),
            state.users.len()
        );
        Ok(Self { path, state: Mutex::new(state) })
    }

    /// Idempotent insert; already-known ids do not touch the disk.
    pub async fn register_user(&self, user_id: UserId) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        if state.users.insert(user_id) {
            debug!("Tracking new user {}", user_id);
            persist_state(&self.path, &*state).await?;
        }
        Ok(())
    }

    pub async fn register_group(&self, chat_id: ChatId) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        if state.groups.insert(chat_id) {
            debug!("Tracking new group {}", chat_id);
            persist_state(&self.path, &*state).await?;
        }
        Ok(())
    }

    /// No-op when the id is not present.
    pub async fn remove_user(&self, user_id: UserId) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        if state.users.remove(&user_id) {
            persist_state(&self.path, &*state).await?;
        }
        Ok(())
    }

    pub async fn remove_group(&self, chat_id: ChatId) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        if state.groups.remove(&chat_id) {
            persist_state(&self.path, &*state).await?;
        }
        Ok(())
    }

    /// Ordered snapshot for broadcast iteration. A single snapshot at the
    /// start of a run is the consistency unit; pruning during the run is
    /// serialized against live registrations by the store lock.
    pub async fn users(&self) -> Vec<UserId> {
        self.state.lock().await.users.iter().copied().collect()
    }

    pub async fn groups(&self) -> Vec<ChatId> {
        self.state.lock().await.groups.iter().copied().collect()
    }

    /// (groups, users) totals for /status.
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.groups.len(), state.users.len())
    }
}
