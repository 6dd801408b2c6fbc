use std::collections::{HashMap, VecDeque};

use super::registry::{LiveChannel, LiveWriteError};
use crate::types::notification::Notification;

pub const DEFAULT_REPLAY_CAPACITY: usize = 10;

/// Notifications missed while a user had no live channel, oldest first.
#[derive(Debug)]
pub struct ReplayQueue {
    capacity: usize,
    pending: HashMap<String, VecDeque<Notification>>,
}

impl Default for ReplayQueue {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }
}

impl ReplayQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: HashMap::new(),
        }
    }

    pub fn enqueue(&mut self, user: &str, notification: Notification) {
        let queue = self.pending.entry(user.to_string()).or_default();
        queue.push_back(notification);
        while queue.len() > self.capacity {
            queue.pop_front();
        }
    }

    /// Writes everything queued for `user` to `channel` and forgets it.
    ///
    /// The queue is cleared before the first write, so a failure partway
    /// through drops the remaining entries.
    pub(crate) fn drain_to(
        &mut self,
        user: &str,
        channel: &LiveChannel,
    ) -> Result<usize, LiveWriteError> {
        let Some(queued) = self.pending.remove(user) else {
            return Ok(0);
        };
        let mut written = 0;
        for notification in queued {
            channel.write(notification)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn len(&self, user: &str) -> usize {
        self.pending.get(user).map_or(0, VecDeque::len)
    }

    pub fn pending(&self, user: &str) -> Vec<Notification> {
        self.pending
            .get(user)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn discard(&mut self, user: &str) -> usize {
        self.pending.remove(user).map_or(0, |queue| queue.len())
    }
}
