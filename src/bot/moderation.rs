// src/bot/moderation.rs - Link detection and the warning ladder

use anyhow::Result;
use log::{debug, info, warn};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::mute::MuteEnforcer;
use crate::platforms::ChatApi;
use crate::storage::WarnStore;
use crate::types::{IncomingMessage, ModerationDecision};

/// Violations accumulate up to this count; reaching it triggers the mute.
/// The user-facing label says "x/3" while the trigger fires on the 4th
/// violation. That mismatch ships as-is.
const MUTE_TRIGGER_COUNT: u32 = 4;
const WARN_LABEL_DENOMINATOR: u32 = 3;

/// Pure text classifier: does the string contain a URL-like fragment?
pub struct LinkDetector {
    pattern: Regex,
}

impl LinkDetector {
    pub fn new() -> Result<Self> {
        // Substring match on purpose: links embedded inside longer words
        // still count.
        let pattern = Regex::new(r"(?i)(https?://|t\.me/|www\.)")?;
        Ok(Self { pattern })
    }

    pub fn is_link(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// A message qualifies when either the sender's biography or the
    /// message body carries a link.
    pub fn has_violation(&self, biography: Option<&str>, body: &str) -> bool {
        biography.map(|bio| self.is_link(bio)).unwrap_or(false) || self.is_link(body)
    }
}

/// Per-message escalation state machine: ignore, warn, or mute-and-reset.
pub struct Moderator {
    detector: LinkDetector,
    warns: Arc<WarnStore>,
    mute_hours: Arc<RwLock<i64>>,
    api: Arc<dyn ChatApi>,
    enforcer: MuteEnforcer,
}

impl Moderator {
    pub fn new(
        warns: Arc<WarnStore>,
        mute_hours: Arc<RwLock<i64>>,
        api: Arc<dyn ChatApi>,
        enforcer: MuteEnforcer,
    ) -> Result<Self> {
        Ok(Self {
            detector: LinkDetector::new()?,
            warns,
            mute_hours,
            api,
            enforcer,
        })
    }

    /// Evaluate a group message against the warning ladder and carry out
    /// the resulting decision.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<ModerationDecision> {
        if !message.chat.kind.is_group() {
            return Ok(ModerationDecision::Allow);
        }

        let chat_id = message.chat.id;
        let user = &message.sender;

        // Administrators and creators are exempt. If the status lookup
        // itself fails we skip evaluation rather than risk muting staff.
        match self.api.member_status(chat_id, user.id).await {
            Ok(status) if status.is_privileged() => return Ok(ModerationDecision::Allow),
            Ok(_) => {}
            Err(e) => {
                warn!("Member status lookup for {} in {} failed: {}", user.id, chat_id, e);
                return Ok(ModerationDecision::Allow);
            }
        }

        let bio = match self.api.user_bio(user.id).await {
            Ok(bio) => bio,
            Err(e) => {
                debug!("Bio lookup for {} failed: {}", user.id, e);
                None
            }
        };

        if !self.detector.has_violation(bio.as_deref(), message.body()) {
            return Ok(ModerationDecision::Allow);
        }

        info!(
            "Link violation by {} ({}) in chat {}",
            user.first_name, user.id, chat_id
        );

        // Best-effort removal of the offending message.
        if let Err(e) = self.api.delete_message(chat_id, message.id).await {
            warn!("Could not delete message {} in {}: {}", message.id, chat_id, e);
        }

        let count = self.warns.increment(user.id).await?;

        if count < MUTE_TRIGGER_COUNT {
            let notice = format!(
                "⚠️ Warning {}/{} to [{}](tg://user?id={}) for link in bio/message.",
                count, WARN_LABEL_DENOMINATOR, user.first_name, user.id
            );
            if let Err(e) = self.api.send_message(chat_id, &notice).await {
                warn!("Could not post warning in {}: {}", chat_id, e);
            }
            return Ok(ModerationDecision::Warn(count));
        }

        // Counter resets before the restriction goes out; a rejected
        // restrict call is accepted lossy behavior.
        self.warns.reset(user.id).await?;

        let hours = *self.mute_hours.read().await;
        let reason = format!("Muted for {} hours due to repeated link spam.", hours);

        if self.enforcer.mute(chat_id, user.id, hours).await {
            let notice = MuteEnforcer::notice_text(user, &reason);
            if let Err(e) = self
                .api
                .send_keyboard(chat_id, &notice, &self.enforcer.notice_keyboard())
                .await
            {
                warn!("Could not post mute notice in {}: {}", chat_id, e);
            }
            self.enforcer.notify(user, &reason).await;
        }

        Ok(ModerationDecision::MuteAndReset { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockApi;
    use crate::types::{ChatKind, ChatRef, MemberStatus, UserProfile};

    fn group_message(chat_id: i64, user_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            id: 100,
            chat: ChatRef { id: chat_id, kind: ChatKind::Supergroup, title: Some("Lounge".into()) },
            sender: UserProfile { id: user_id, first_name: "Ann".into(), username: None },
            text: Some(text.to_string()),
            caption: None,
            photo_file_id: None,
            reply_to: None,
        }
    }

    async fn moderator_with(api: Arc<MockApi>) -> (Moderator, Arc<WarnStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let warns = Arc::new(WarnStore::load(dir.path().join("warns.json")).await.unwrap());
        let api_dyn: Arc<dyn ChatApi> = api;
        let enforcer = MuteEnforcer::new(Arc::clone(&api_dyn), "updates".into(), "warden_bot".into());
        let moderator = Moderator::new(
            Arc::clone(&warns),
            Arc::new(RwLock::new(2)),
            api_dyn,
            enforcer,
        )
        .unwrap();
        (moderator, warns, dir)
    }

    #[test]
    fn link_detector_truth_table() {
        let detector = LinkDetector::new().unwrap();
        assert!(detector.is_link("Check this: http://spam.example"));
        assert!(detector.is_link("HTTPS://CAPS.example"));
        assert!(detector.is_link("www.legit-looking"));
        assert!(detector.is_link("join t.me/chan now"));
        assert!(detector.is_link("embeddedwww.inside"));
        assert!(!detector.is_link("contact me at @alice"));
        assert!(!detector.is_link("hello world"));
    }

    #[test]
    fn bio_alone_is_a_violation() {
        let detector = LinkDetector::new().unwrap();
        assert!(detector.has_violation(Some("see t.me/me"), "harmless"));
        assert!(detector.has_violation(None, "visit www.spam"));
        assert!(!detector.has_violation(Some("just a person"), "hi"));
    }

    #[tokio::test]
    async fn clean_message_is_allowed() {
        let api = Arc::new(MockApi::new());
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        let decision = moderator
            .handle_message(&group_message(-1, 7, "good morning"))
            .await
            .unwrap();

        assert_eq!(decision, ModerationDecision::Allow);
        assert_eq!(warns.count(7).await, 0);
        assert!(api.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn warns_accumulate_then_mute_resets() {
        let api = Arc::new(MockApi::new());
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        for expected in 1..=3u32 {
            let decision = moderator
                .handle_message(&group_message(-1, 7, "spam http://x.example"))
                .await
                .unwrap();
            assert_eq!(decision, ModerationDecision::Warn(expected));
            assert_eq!(warns.count(7).await, expected);
        }

        let decision = moderator
            .handle_message(&group_message(-1, 7, "spam http://x.example"))
            .await
            .unwrap();
        assert!(matches!(decision, ModerationDecision::MuteAndReset { .. }));
        assert_eq!(warns.count(7).await, 0);

        let restricted = api.restricted.lock().unwrap();
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].0, -1);
        assert_eq!(restricted[0].1, 7);
    }

    #[tokio::test]
    async fn warning_notice_shows_out_of_three() {
        let api = Arc::new(MockApi::new());
        let (moderator, _warns, _dir) = moderator_with(Arc::clone(&api)).await;

        moderator
            .handle_message(&group_message(-1, 7, "t.me/spam"))
            .await
            .unwrap();

        let notices = api.sent_to(-1);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("Warning 1/3"));
    }

    #[tokio::test]
    async fn bio_link_triggers_violation() {
        let api = Arc::new(MockApi::new());
        api.set_bio(7, "promo at www.shady.example");
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        let decision = moderator
            .handle_message(&group_message(-1, 7, "totally innocent text"))
            .await
            .unwrap();

        assert_eq!(decision, ModerationDecision::Warn(1));
        assert_eq!(warns.count(7).await, 1);
        assert_eq!(api.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admins_are_exempt() {
        let api = Arc::new(MockApi::new());
        api.set_status(-1, 7, MemberStatus::Administrator);
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        let decision = moderator
            .handle_message(&group_message(-1, 7, "http://allowed.example"))
            .await
            .unwrap();

        assert_eq!(decision, ModerationDecision::Allow);
        assert_eq!(warns.count(7).await, 0);
    }

    #[tokio::test]
    async fn private_chats_are_not_evaluated() {
        let api = Arc::new(MockApi::new());
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        let mut message = group_message(7, 7, "http://spam.example");
        message.chat.kind = ChatKind::Private;

        let decision = moderator.handle_message(&message).await.unwrap();
        assert_eq!(decision, ModerationDecision::Allow);
        assert_eq!(warns.count(7).await, 0);
    }

    #[tokio::test]
    async fn failed_delete_does_not_stop_escalation() {
        let api = Arc::new(MockApi::new());
        api.delete_rejected.lock().unwrap().insert(-1);
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        let decision = moderator
            .handle_message(&group_message(-1, 7, "http://x.example"))
            .await
            .unwrap();

        assert_eq!(decision, ModerationDecision::Warn(1));
        assert_eq!(warns.count(7).await, 1);
    }

    #[tokio::test]
    async fn rejected_restrict_still_resets_counter() {
        let api = Arc::new(MockApi::new());
        api.restrict_rejected.lock().unwrap().insert(-1);
        let (moderator, warns, _dir) = moderator_with(Arc::clone(&api)).await;

        for _ in 0..4 {
            moderator
                .handle_message(&group_message(-1, 7, "http://x.example"))
                .await
                .unwrap();
        }

        // Accepted lossy behavior: the reset is not rolled back when the
        // platform refuses the restriction.
        assert_eq!(warns.count(7).await, 0);
        assert!(api.restricted.lock().unwrap().is_empty());
    }
}
