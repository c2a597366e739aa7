//! Test doubles for the service ports.

use std::sync::Mutex;

use crate::models::Notification;

use super::notifier::NotificationSink;

/// Keeps every emitted notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(notification);
        }
    }
}
