use std::collections::HashSet;

use futures_util::future::join_all;
use serde::Serialize;

use crate::error::{NotifyError, PushDeliveryError};
use crate::ports::{PushSender, PushSubscriptionStore, TimeProvider};
use crate::types::notification::{Notification, RawNotification};
use crate::types::push::PushSubscription;

pub mod format;
pub mod queue;
pub mod registry;

pub use format::format;
pub use queue::{DEFAULT_REPLAY_CAPACITY, ReplayQueue};
pub use registry::{
    BroadcastReport, ChannelRegistry, DEFAULT_STREAM_BUFFER, LiveDelivery, LiveStream,
    LiveWriteError,
};

#[derive(Debug, Clone, Copy)]
pub struct NotifierOptions {
    pub replay_capacity: usize,
    pub stream_buffer: usize,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub pruned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Reached the live stream or at least one push endpoint.
    Sent,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientReport {
    pub user_id: String,
    pub status: DeliveryStatus,
    pub live: LiveDelivery,
    pub push: PushReport,
}

impl RecipientReport {
    fn new(user: &str, live: LiveDelivery, push: PushReport) -> Self {
        let status = if live == LiveDelivery::Live || push.delivered > 0 {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Queued
        };
        Self {
            user_id: user.to_string(),
            status,
            live,
            push,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub sent_live: usize,
    pub queued: usize,
    pub push_attempted: usize,
    pub push_delivered: usize,
    pub push_pruned: usize,
    pub recipients: Vec<RecipientReport>,
}

impl DispatchSummary {
    pub fn from_reports(recipients: Vec<RecipientReport>) -> Self {
        let mut summary = Self::default();
        for report in &recipients {
            match report.live {
                LiveDelivery::Live => summary.sent_live += 1,
                LiveDelivery::Queued => summary.queued += 1,
            }
            summary.push_attempted += report.push.attempted;
            summary.push_delivered += report.push.delivered;
            summary.push_pruned += report.push.pruned;
        }
        summary.recipients = recipients;
        summary
    }
}

/// Fans notifications out to live streams, the replay queue and Web Push.
///
/// One instance per process, built by the composition root. Push is
/// optional: without a sender only the live and queued paths run.
pub struct Notifier<S, P, T> {
    registry: ChannelRegistry,
    store: S,
    push: Option<P>,
    time: T,
}

impl<S, P, T> Notifier<S, P, T>
where
    S: PushSubscriptionStore,
    P: PushSender,
    T: TimeProvider,
{
    pub fn new(store: S, push: Option<P>, time: T, options: NotifierOptions) -> Self {
        Self {
            registry: ChannelRegistry::new(options.replay_capacity, options.stream_buffer),
            store,
            push,
            time,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn push_enabled(&self) -> bool {
        self.push.is_some()
    }

    pub fn open_live_channel(&self, user: &str) -> LiveStream {
        self.registry.register(user)
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.registry.is_online(user)
    }

    pub fn online_count(&self) -> usize {
        self.registry.count_online()
    }

    pub fn remove_user(&self, user: &str) -> bool {
        self.registry.remove(user)
    }

    /// Closes every live stream and refuses new ones. Returns how many were
    /// open.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }

    pub async fn subscribe_push(
        &self,
        user: &str,
        subscription: PushSubscription,
    ) -> Result<bool, NotifyError> {
        if self.push.is_none() {
            return Err(NotifyError::PushNotConfigured);
        }
        if !subscription.is_complete() {
            return Err(NotifyError::InvalidSubscription(
                "endpoint, p256dh, and auth are required",
            ));
        }
        Ok(self.store.upsert(user, subscription).await?)
    }

    pub async fn unsubscribe_push(&self, user: &str, endpoint: &str) -> Result<bool, NotifyError> {
        Ok(self.store.delete(user, endpoint).await?)
    }

    pub async fn notify_user(&self, user: &str, raw: RawNotification) -> RecipientReport {
        let notification = format(raw, self.time.now());
        let payload = self.push_payload(&notification);
        self.dispatch(user, notification, payload.as_deref()).await
    }

    /// Each user is handled independently; one user's failures never affect
    /// another's delivery.
    pub async fn notify_users(&self, users: &[String], raw: RawNotification) -> DispatchSummary {
        let notification = format(raw, self.time.now());
        let payload = self.push_payload(&notification);
        let mut seen = HashSet::new();
        let targets: Vec<&str> = users
            .iter()
            .map(String::as_str)
            .filter(|user| seen.insert(*user))
            .collect();
        let reports = join_all(
            targets
                .into_iter()
                .map(|user| self.dispatch(user, notification.clone(), payload.as_deref())),
        )
        .await;
        DispatchSummary::from_reports(reports)
    }

    /// Live streams only; offline users are neither queued nor pushed.
    pub fn broadcast(&self, raw: RawNotification) -> BroadcastReport {
        let notification = format(raw, self.time.now());
        let report = self.registry.broadcast(&notification);
        tracing::info!(
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast notification"
        );
        report
    }

    async fn dispatch(
        &self,
        user: &str,
        notification: Notification,
        payload: Option<&str>,
    ) -> RecipientReport {
        let live = self.registry.deliver(user, notification);
        let push = match payload {
            Some(payload) => self.push_to(user, payload).await,
            None => PushReport::default(),
        };
        RecipientReport::new(user, live, push)
    }

    async fn push_to(&self, user: &str, payload: &str) -> PushReport {
        let Some(sender) = self.push.as_ref() else {
            return PushReport::default();
        };
        let subscriptions = match self.store.get_all(user).await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                tracing::warn!(user, error = %err, "failed to load push subscriptions");
                return PushReport {
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        };

        let mut report = PushReport {
            attempted: subscriptions.len(),
            ..Default::default()
        };
        let results = join_all(
            subscriptions
                .iter()
                .map(|subscription| sender.send(subscription, payload)),
        )
        .await;

        for (subscription, result) in subscriptions.iter().zip(results) {
            let endpoint = subscription.endpoint.as_str();
            match result {
                Ok(()) => report.delivered += 1,
                Err(PushDeliveryError::Gone { status }) => {
                    report.failed += 1;
                    match self.store.delete(user, endpoint).await {
                        Ok(true) => {
                            report.pruned += 1;
                            tracing::info!(user, endpoint, status, "pruned expired push subscription");
                        }
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(user, endpoint, error = %err, "failed to prune push subscription")
                        }
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(user, endpoint, error = %err, "push delivery failed");
                }
            }
        }
        report
    }

    fn push_payload(&self, notification: &Notification) -> Option<String> {
        self.push.as_ref()?;
        match serde_json::to_string(notification) {
            Ok(payload) => Some(payload),
            Err(err) => {
                tracing::error!(id = %notification.id, error = %err, "failed to encode push payload");
                None
            }
        }
    }
}
