// src/bot/join_guard.rs - Screens newly joined members by display name

use anyhow::Result;
use log::info;

use crate::bot::moderation::LinkDetector;
use crate::bot::mute::{MuteEnforcer, PERMANENT_MUTE_HOURS};
use crate::types::{ChatRef, UserProfile};

/// Escalates straight past the warning ladder: a member whose display
/// name carries a link or an @ mention is restricted permanently on
/// arrival. The warn counter is never consulted or changed.
pub struct JoinGuard {
    detector: LinkDetector,
    enforcer: MuteEnforcer,
}

impl JoinGuard {
    pub fn new(enforcer: MuteEnforcer) -> Result<Self> {
        Ok(Self { detector: LinkDetector::new()?, enforcer })
    }

    fn name_is_spam(&self, name: &str) -> bool {
        self.detector.is_link(name) || name.contains('@')
    }

    pub async fn handle_join(&self, chat: &ChatRef, members: &[UserProfile]) -> Result<()> {
        for member in members {
            if !self.name_is_spam(&member.first_name) {
                continue;
            }

            info!(
                "Join-time mute for {} ({}) in chat {}: link in name",
                member.first_name, member.id, chat.id
            );
            self.enforcer
                .mute(chat.id, member.id, PERMANENT_MUTE_HOURS)
                .await;
            self.enforcer
                .notify(member, "Permanently muted due to link in name.")
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockApi;
    use crate::platforms::ChatApi;
    use crate::types::ChatKind;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn guard_with(api: Arc<MockApi>) -> JoinGuard {
        let api_dyn: Arc<dyn ChatApi> = api;
        JoinGuard::new(MuteEnforcer::new(api_dyn, "updates".into(), "warden_bot".into())).unwrap()
    }

    fn lounge() -> ChatRef {
        ChatRef { id: -1, kind: ChatKind::Group, title: Some("Lounge".into()) }
    }

    fn member(id: i64, name: &str) -> UserProfile {
        UserProfile { id, first_name: name.to_string(), username: None }
    }

    #[tokio::test]
    async fn link_name_is_muted_permanently() {
        let api = Arc::new(MockApi::new());
        let guard = guard_with(Arc::clone(&api));

        guard
            .handle_join(&lounge(), &[member(8, "t.me/spamchannel")])
            .await
            .unwrap();

        let restricted = api.restricted.lock().unwrap();
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].1, 8);
        // Far-future until-date, well beyond any session-scale mute.
        assert!(restricted[0].2 > Utc::now() + Duration::days(365 * 50));
    }

    #[tokio::test]
    async fn mention_marker_in_name_is_muted() {
        let api = Arc::new(MockApi::new());
        let guard = guard_with(Arc::clone(&api));

        guard
            .handle_join(&lounge(), &[member(9, "dm @promoguy")])
            .await
            .unwrap();

        assert_eq!(api.restricted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plain_names_pass_through() {
        let api = Arc::new(MockApi::new());
        let guard = guard_with(Arc::clone(&api));

        guard
            .handle_join(&lounge(), &[member(10, "Alice"), member(11, "Bob")])
            .await
            .unwrap();

        assert!(api.restricted.lock().unwrap().is_empty());
    }
}
