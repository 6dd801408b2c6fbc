use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::queue::ReplayQueue;
use crate::types::notification::Notification;

pub const DEFAULT_STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LiveWriteError {
    #[error("live stream closed")]
    Closed,
    #[error("live stream buffer is full")]
    Full,
}

/// Sending half of one user's live connection.
#[derive(Debug, Clone)]
pub(crate) struct LiveChannel {
    id: u64,
    sender: mpsc::Sender<Notification>,
}

impl LiveChannel {
    pub(crate) fn open(id: u64, buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { id, sender }, receiver)
    }

    pub(crate) fn write(&self, notification: Notification) -> Result<(), LiveWriteError> {
        self.sender.try_send(notification).map_err(|err| match err {
            TrySendError::Closed(_) => LiveWriteError::Closed,
            TrySendError::Full(_) => LiveWriteError::Full,
        })
    }
}

/// Whether a single-user delivery reached the live stream or was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveDelivery {
    Live,
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug)]
struct RegistryState {
    channels: HashMap<String, LiveChannel>,
    queue: ReplayQueue,
    closed: bool,
}

/// Live delivery channels keyed by user, plus the replay queue they drain.
///
/// Both maps sit behind one lock so a lookup, a write and the fallback
/// enqueue for a user complete as a single step.
#[derive(Debug)]
pub struct ChannelRegistry {
    state: Arc<Mutex<RegistryState>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(super::queue::DEFAULT_REPLAY_CAPACITY, DEFAULT_STREAM_BUFFER)
    }
}

impl ChannelRegistry {
    pub fn new(replay_capacity: usize, buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                channels: HashMap::new(),
                queue: ReplayQueue::new(replay_capacity),
                closed: false,
            })),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a live channel for `user`, replacing any previous one, and
    /// replays whatever was queued while the user was away.
    ///
    /// The channel always has room for the whole backlog on top of the
    /// configured buffer. After `shutdown` the returned stream ends at once.
    pub fn register(&self, user: &str) -> LiveStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        let backlog = state.queue.len(user);
        let (channel, receiver) = LiveChannel::open(id, self.buffer.max(backlog));
        if state.closed {
            tracing::debug!(user, "registry closed, refusing live channel");
        } else {
            if state.channels.insert(user.to_string(), channel.clone()).is_some() {
                tracing::debug!(user, "replaced existing live channel");
            }
            match state.queue.drain_to(user, &channel) {
                Ok(0) => {}
                Ok(replayed) => tracing::debug!(user, replayed, "replayed queued notifications"),
                Err(err) => {
                    tracing::warn!(user, error = %err, "replay interrupted, dropped remaining entries")
                }
            }
        }
        drop(state);

        LiveStream {
            receiver,
            guard: ChannelGuard {
                state: Arc::downgrade(&self.state),
                user: user.to_string(),
                id,
            },
        }
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.lock().channels.contains_key(user)
    }

    pub fn count_online(&self) -> usize {
        self.lock().channels.len()
    }

    /// Drops the live channel and the queued entries for `user`.
    pub fn remove(&self, user: &str) -> bool {
        let mut state = self.lock();
        let closed = state.channels.remove(user).is_some();
        let discarded = state.queue.discard(user);
        closed || discarded > 0
    }

    /// Writes to the live channel when there is one; otherwise, or when the
    /// write fails, queues for replay.
    pub fn deliver(&self, user: &str, notification: Notification) -> LiveDelivery {
        let mut state = self.lock();
        if let Some(channel) = state.channels.get(user) {
            match channel.write(notification.clone()) {
                Ok(()) => return LiveDelivery::Live,
                Err(err) => {
                    tracing::warn!(user, error = %err, "live write failed, evicting channel");
                    state.channels.remove(user);
                }
            }
        }
        state.queue.enqueue(user, notification);
        LiveDelivery::Queued
    }

    /// Writes to every live channel, evicting the ones that fail.
    pub fn broadcast(&self, notification: &Notification) -> BroadcastReport {
        let mut state = self.lock();
        let mut report = BroadcastReport::default();
        state.channels.retain(|user, channel| match channel.write(notification.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "broadcast write failed, evicting channel");
                report.dropped += 1;
                false
            }
        });
        report
    }

    pub fn pending(&self, user: &str) -> Vec<Notification> {
        self.lock().queue.pending(user)
    }

    /// Closes every live channel and refuses new ones. Queued entries are
    /// kept.
    pub fn shutdown(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let closed = state.channels.len();
        state.channels.clear();
        closed
    }
}

/// Removes a connection's entry when its stream goes away, unless a newer
/// connection for the same user has replaced it in the meantime.
#[derive(Debug)]
struct ChannelGuard {
    state: Weak<Mutex<RegistryState>>,
    user: String,
    id: u64,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let Some(shared) = self.state.upgrade() else {
            return;
        };
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state
            .channels
            .get(&self.user)
            .is_some_and(|channel| channel.id == self.id)
        {
            state.channels.remove(&self.user);
            tracing::debug!(user = %self.user, "live channel closed");
        }
    }
}

/// Receiving half of a live connection. Ends when the channel is replaced,
/// evicted or the registry shuts down.
#[derive(Debug)]
pub struct LiveStream {
    receiver: mpsc::Receiver<Notification>,
    guard: ChannelGuard,
}

impl LiveStream {
    pub fn user(&self) -> &str {
        &self.guard.user
    }
}

impl Stream for LiveStream {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::notify::format::format;
    use crate::types::notification::RawNotification;
    use futures_util::StreamExt;
    use time::OffsetDateTime;

    fn notification(id: &str) -> Notification {
        let raw = RawNotification {
            id: Some(id.to_string()),
            ..RawNotification::new("Title", "Message")
        };
        format(raw, OffsetDateTime::UNIX_EPOCH)
    }

    #[tokio::test]
    async fn register__should_replace_previous_channel_for_same_user() {
        // Given
        let registry = ChannelRegistry::default();
        let mut first = registry.register("alice");

        // When
        let mut second = registry.register("alice");

        // Then
        assert_eq!(registry.count_online(), 1);
        assert_eq!(first.next().await, None);
        assert_eq!(registry.deliver("alice", notification("n1")), LiveDelivery::Live);
        assert_eq!(second.next().await.map(|n| n.id), Some("n1".to_string()));
    }

    #[tokio::test]
    async fn register__should_replay_queued_notifications() {
        // Given
        let registry = ChannelRegistry::default();
        registry.deliver("alice", notification("n1"));
        registry.deliver("alice", notification("n2"));

        // When
        let mut stream = registry.register("alice");

        // Then
        assert_eq!(stream.next().await.map(|n| n.id), Some("n1".to_string()));
        assert_eq!(stream.next().await.map(|n| n.id), Some("n2".to_string()));
        assert!(registry.pending("alice").is_empty());
    }

    #[tokio::test]
    async fn register__should_replay_backlog_larger_than_stream_buffer() {
        // Given
        let registry = ChannelRegistry::new(20, 4);
        for index in 0..10 {
            registry.deliver("alice", notification(&format!("n{index}")));
        }

        // When
        let stream = registry.register("alice");

        // Then
        assert!(registry.pending("alice").is_empty());
        let ids: Vec<String> = stream.take(10).map(|n| n.id).collect().await;
        let expected: Vec<String> = (0..10).map(|index| format!("n{index}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn drop__should_remove_entry_when_stream_closes() {
        let registry = ChannelRegistry::default();
        let stream = registry.register("alice");
        assert!(registry.is_online("alice"));

        drop(stream);

        assert!(!registry.is_online("alice"));
        assert_eq!(registry.count_online(), 0);
    }

    #[test]
    fn drop__should_keep_newer_channel_when_replaced_stream_closes() {
        // Given
        let registry = ChannelRegistry::default();
        let first = registry.register("alice");
        let _second = registry.register("alice");

        // When
        drop(first);

        // Then
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn deliver__should_queue_when_user_offline() {
        let registry = ChannelRegistry::default();

        let delivery = registry.deliver("alice", notification("n1"));

        assert_eq!(delivery, LiveDelivery::Queued);
        assert_eq!(registry.pending("alice").len(), 1);
    }

    #[test]
    fn deliver__should_evict_and_queue_when_live_write_fails() {
        // Given
        let registry = ChannelRegistry::default();
        let (channel, receiver) = LiveChannel::open(99, 4);
        drop(receiver);
        registry
            .lock()
            .channels
            .insert("alice".to_string(), channel);

        // When
        let delivery = registry.deliver("alice", notification("n1"));

        // Then
        assert_eq!(delivery, LiveDelivery::Queued);
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.pending("alice").len(), 1);
    }

    #[test]
    fn broadcast__should_drop_closed_channels_in_same_pass() {
        // Given
        let registry = ChannelRegistry::default();
        let _x = registry.register("x");
        let _z = registry.register("z");
        let (channel, receiver) = LiveChannel::open(99, 4);
        drop(receiver);
        registry.lock().channels.insert("y".to_string(), channel);

        // When
        let report = registry.broadcast(&notification("b1"));

        // Then
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });
        assert_eq!(registry.count_online(), 2);
        assert!(!registry.is_online("y"));
        assert!(registry.pending("y").is_empty());
    }

    #[test]
    fn remove__should_drop_channel_and_queue_and_be_idempotent() {
        let registry = ChannelRegistry::default();
        registry.deliver("bob", notification("n1"));
        let _stream = registry.register("alice");
        registry.deliver("alice", notification("n2"));

        assert!(registry.remove("alice"));
        assert!(registry.remove("bob"));
        assert!(!registry.remove("alice"));
        assert!(registry.pending("bob").is_empty());
        assert_eq!(registry.count_online(), 0);
    }

    #[tokio::test]
    async fn shutdown__should_end_every_stream() {
        let registry = ChannelRegistry::default();
        let mut alice = registry.register("alice");
        let mut bob = registry.register("bob");

        let closed = registry.shutdown();

        assert_eq!(closed, 2);
        assert_eq!(alice.next().await, None);
        assert_eq!(bob.next().await, None);
        assert_eq!(registry.count_online(), 0);
    }

    #[tokio::test]
    async fn register__should_end_immediately_after_shutdown() {
        // Given
        let registry = ChannelRegistry::default();
        registry.shutdown();
        registry.deliver("alice", notification("n1"));

        // When
        let mut stream = registry.register("alice");

        // Then
        assert_eq!(stream.next().await, None);
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.pending("alice").len(), 1);
    }
}
