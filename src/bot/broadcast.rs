// src/bot/broadcast.rs - Owner broadcast fan-out with pruning

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::time::{sleep, timeout, Duration};

use crate::error::BotError;
use crate::platforms::ChatApi;
use crate::storage::Registry;
use crate::types::{BroadcastContent, BroadcastOptions, BroadcastReport, ChatId, MessageId};

/// Pacing knobs for a broadcast run. The platform imposes abuse limits,
/// so deliveries are bounded in flight, spaced out, and individually
/// timed out.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub max_in_flight: usize,
    pub pace: Duration,
    pub per_target_timeout: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            pace: Duration::from_millis(50),
            per_target_timeout: Duration::from_secs(10),
        }
    }
}

/// Fans an owner-supplied message out to every known group and,
/// optionally, every known user. Targets that refuse delivery are pruned
/// from the registry; one target's failure never stops the batch. Runs
/// as its own task so live event handling is never blocked.
pub struct BroadcastDispatcher {
    api: Arc<dyn ChatApi>,
    registry: Arc<Registry>,
    settings: BroadcastSettings,
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl BroadcastDispatcher {
    pub fn new(api: Arc<dyn ChatApi>, registry: Arc<Registry>, settings: BroadcastSettings) -> Self {
        Self { api, registry, settings, cancel: Mutex::new(None) }
    }

    /// Cancel the in-flight run, if any. Returns whether one was active.
    pub async fn cancel_active(&self) -> bool {
        match self.cancel.lock().await.as_ref() {
            Some(sender) => sender.send(true).is_ok(),
            None => false,
        }
    }

    /// Run a full broadcast: all groups first, then users when requested.
    /// The registry snapshot is taken once per pass at its start.
    pub async fn dispatch(
        &self,
        content: BroadcastContent,
        options: BroadcastOptions,
    ) -> BroadcastReport {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel.lock().await = Some(cancel_tx);

        let mut report = BroadcastReport::default();

        let groups = self.registry.groups().await;
        info!("Broadcast starting: {} group targets", groups.len());
        let (delivered, pruned) = self
            .run_pass(&groups, &content, options.pin_in_groups, true, cancel_rx.clone())
            .await;
        report.delivered += delivered;
        report.pruned_groups = pruned;

        if options.to_users && !*cancel_rx.borrow() {
            let users = self.registry.users().await;
            info!("Broadcast continuing: {} user targets", users.len());
            let (delivered, pruned) = self
                .run_pass(&users, &content, false, false, cancel_rx.clone())
                .await;
            report.delivered += delivered;
            report.pruned_users = pruned;
        }

        report.cancelled = *cancel_rx.borrow();
        *self.cancel.lock().await = None;

        info!(
            "Broadcast finished: {} delivered, {} groups pruned, {} users pruned{}",
            report.delivered,
            report.pruned_groups,
            report.pruned_users,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    async fn run_pass(
        &self,
        targets: &[ChatId],
        content: &BroadcastContent,
        pin: bool,
        groups: bool,
        cancel_rx: watch::Receiver<bool>,
    ) -> (usize, usize) {
        let delivered = Arc::new(AtomicUsize::new(0));
        let pruned = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.settings.max_in_flight));
        let per_target_timeout = self.settings.per_target_timeout;
        let mut handles = Vec::with_capacity(targets.len());

        for &target in targets {
            if *cancel_rx.borrow() {
                info!("Broadcast pass cancelled with targets remaining");
                break;
            }

            // Inter-request pacing between launches.
            sleep(self.settings.pace).await;

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let api = Arc::clone(&self.api);
            let registry = Arc::clone(&self.registry);
            let content = content.clone();
            let delivered = Arc::clone(&delivered);
            let pruned = Arc::clone(&pruned);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let attempt =
                    timeout(per_target_timeout, Self::deliver(&*api, target, &content)).await;

                match attempt {
                    Ok(Ok(message_id)) => {
                        delivered.fetch_add(1, Ordering::SeqCst);
                        if pin {
                            // Pin failure is not a delivery failure.
                            if let Err(e) = api.pin_message(target, message_id).await {
                                debug!("Could not pin broadcast in {}: {}", target, e);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        warn!("Pruning broadcast target: {}", e);
                        Self::prune(&registry, target, groups, &pruned).await;
                    }
                    Err(_) => {
                        warn!("Broadcast delivery to {} timed out, pruning", target);
                        Self::prune(&registry, target, groups, &pruned).await;
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Broadcast delivery task panicked: {}", e);
            }
        }

        (delivered.load(Ordering::SeqCst), pruned.load(Ordering::SeqCst))
    }

    async fn deliver(
        api: &dyn ChatApi,
        target: ChatId,
        content: &BroadcastContent,
    ) -> Result<MessageId, BotError> {
        let result = match content {
            BroadcastContent::Text(text) => api.send_message(target, text).await,
            BroadcastContent::Photo { file_id, caption } => {
                api.send_photo(target, file_id, caption.as_deref()).await
            }
        };
        result.map_err(|_| BotError::Delivery(target))
    }

    async fn prune(registry: &Registry, target: ChatId, groups: bool, pruned: &AtomicUsize) {
        let result = if groups {
            registry.remove_group(target).await
        } else {
            registry.remove_user(target).await
        };
        match result {
            Ok(()) => {
                pruned.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => error!("Failed to prune unreachable target {}: {}", target, e),
        }
    }
}
