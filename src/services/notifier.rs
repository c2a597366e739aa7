//! Outbound notification port and its in-process fan-out adapter.
//!
//! Services hold an `Arc<dyn NotificationSink>` and call `emit` after a
//! ticket state change has been persisted. Emission is fire-and-forget: it
//! never blocks and never reports failure back to the caller.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::models::Notification;

const CHANNEL_CAPACITY: usize = 256;

pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn emit(&self, notification: Notification) {
        trace!(kind = ?notification.kind, "Dropping notification");
    }
}

type TopicMap = HashMap<Uuid, broadcast::Sender<Notification>>;
type Topics = Arc<RwLock<TopicMap>>;

fn read(topics: &Topics) -> RwLockReadGuard<'_, TopicMap> {
    // A poisoned map is still structurally valid.
    topics.read().unwrap_or_else(|e| e.into_inner())
}

fn write(topics: &Topics) -> RwLockWriteGuard<'_, TopicMap> {
    topics.write().unwrap_or_else(|e| e.into_inner())
}

/// Per-user topics with a global channel as fallback.
///
/// A notification goes to the owning user's topic when someone is listening
/// there. Otherwise it is broadcast on the global channel. A user topic lives
/// exactly as long as at least one [`Subscription`] to it.
#[derive(Clone)]
pub struct NotificationHub {
    topics: Topics,
    global: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            global: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_user(&self, user_id: Uuid) -> Subscription {
        let receiver = write(&self.topics)
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            receiver,
            topic: Some((user_id, self.topics.clone())),
        }
    }

    pub fn subscribe_global(&self) -> Subscription {
        Subscription {
            receiver: self.global.subscribe(),
            topic: None,
        }
    }

    pub fn topic_count(&self) -> usize {
        read(&self.topics).len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotificationHub {
    fn emit(&self, notification: Notification) {
        let user_id = notification.user_id;

        let undelivered = match read(&self.topics).get(&user_id) {
            Some(sender) => sender.send(notification).err().map(|e| e.0),
            None => Some(notification),
        };

        let Some(notification) = undelivered else {
            debug!(%user_id, "Notification delivered to user topic");
            return;
        };

        match self.global.send(notification) {
            Ok(receivers) => debug!(%user_id, receivers, "Notification broadcast globally"),
            Err(_) => trace!(%user_id, "No notification subscribers"),
        }
    }
}

/// Receiving end of a hub topic.
///
/// Dropping the last subscription of a user removes that user's topic.
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
    topic: Option<(Uuid, Topics)>,
}

impl Deref for Subscription {
    type Target = broadcast::Receiver<Notification>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}

impl DerefMut for Subscription {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.receiver
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some((user_id, topics)) = self.topic.take() else {
            return;
        };
        // New subscribers need the write lock, so the count cannot grow here.
        // Our own receiver is still alive and counted.
        let mut topics = write(&topics);
        if topics
            .get(&user_id)
            .is_some_and(|sender| sender.receiver_count() <= 1)
        {
            topics.remove(&user_id);
            trace!(%user_id, "Removed idle notification topic");
        }
    }
}
