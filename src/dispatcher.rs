//! Real-time delivery of notifications to a user's live connections.
//!
//! Delivery is best effort: with no live connection the notification is
//! dropped. The `is_sent` flags in the store are the durable record.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::models::Notification;

/// Buffered notifications per user before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Somewhere notifications can be pushed
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    /// Push `notification` to every live connection of `user_id`.
    ///
    /// Returns how many connections received it; 0 means it was dropped.
    fn deliver(&self, user_id: i64, notification: &Notification) -> usize;
}

/// Per-user broadcast channels
#[derive(Debug, Default)]
pub struct NotificationHub {
    channels: DashMap<i64, broadcast::Sender<Notification>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a receiver on the channel of `user_id`, creating the channel if needed
    pub fn subscribe(&self, user_id: i64) -> broadcast::Receiver<Notification> {
        let receiver = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        debug!(user_id, "Subscribed to notifications");
        receiver
    }

    /// Drop the channel of `user_id` once nobody listens on it
    pub fn prune(&self, user_id: i64) {
        self.channels
            .remove_if(&user_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of open receivers across all users
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.channels.iter().map(|entry| entry.value().receiver_count()).sum()
    }
}

impl NotificationSink for NotificationHub {
    fn deliver(&self, user_id: i64, notification: &Notification) -> usize {
        let Some(sender) = self.channels.get(&user_id).map(|entry| entry.value().clone()) else {
            trace!(user_id, "No live connection, notification dropped");
            return 0;
        };

        match sender.send(notification.clone()) {
            Ok(receivers) => receivers,
            Err(_) => {
                self.prune(user_id);
                trace!(user_id, "All connections closed, notification dropped");
                0
            },
        }
    }
}
