//! Transient, self-expiring notifications.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::event::ChatEvent;
use crate::protocol::Timestamp;

/// Default lifetime of a notification.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationKind {
    #[default]
    Info,
    Message,
    Announcement,
    Alert,
    Error,
}

/// A notification as handed to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationItem {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub created_at: Timestamp,
    pub ttl: Duration,
}

/// Live notifications, each removed when its TTL elapses or on dismissal.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    ttl: Duration,
    items: Vec<(NotificationItem, Instant)>,
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Vec::new(),
        }
    }

    /// Enqueue a notification. Identical notifications are not merged.
    pub fn show(
        &mut self,
        title: impl Into<String>,
        body: impl Into<String>,
        kind: NotificationKind,
        now: Instant,
        created_at: Timestamp,
    ) -> NotificationItem {
        let item = NotificationItem {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            kind,
            created_at,
            ttl: self.ttl,
        };
        self.items.push((item.clone(), now + self.ttl));
        item
    }

    /// Remove a notification early. Unknown ids are ignored.
    pub fn dismiss(&mut self, id: Uuid) -> Option<ChatEvent> {
        let index = self.items.iter().position(|(item, _)| item.id == id)?;
        self.items.remove(index);
        Some(ChatEvent::NotificationDismissed { id, expired: false })
    }

    /// Live notifications, oldest first.
    pub fn items(&self) -> Vec<NotificationItem> {
        self.items.iter().map(|(item, _)| item.clone()).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.items.iter().map(|(_, expires_at)| *expires_at).min()
    }

    /// Remove every notification whose TTL elapsed at or before `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        self.items.retain(|(item, expires_at)| {
            if *expires_at <= now {
                events.push(ChatEvent::NotificationDismissed {
                    id: item.id,
                    expired: true,
                });
                false
            } else {
                true
            }
        });
        events
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let mut queue = NotificationQueue::new(DEFAULT_NOTIFICATION_TTL);
        let start = Instant::now();
        let id = queue.show("t", "b", NotificationKind::Info, start, 0).id;

        assert!(queue.poll(start + Duration::from_millis(4999)).is_empty());
        let events = queue.poll(start + Duration::from_millis(5000));
        assert_eq!(
            events,
            vec![ChatEvent::NotificationDismissed { id, expired: true }]
        );
        assert!(queue.items().is_empty());
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn dismiss_removes_early() {
        let mut queue = NotificationQueue::new(DEFAULT_NOTIFICATION_TTL);
        let start = Instant::now();
        let id = queue.show("t", "b", NotificationKind::Alert, start, 0).id;

        assert_eq!(
            queue.dismiss(id),
            Some(ChatEvent::NotificationDismissed { id, expired: false })
        );
        assert!(queue.dismiss(id).is_none());
        assert!(queue.poll(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn duplicates_are_kept_with_distinct_ids() {
        let mut queue = NotificationQueue::new(DEFAULT_NOTIFICATION_TTL);
        let now = Instant::now();
        let a = queue.show("same", "same", NotificationKind::Message, now, 0).id;
        let b = queue.show("same", "same", NotificationKind::Message, now, 0).id;
        assert_ne!(a, b);
        assert_eq!(queue.items().len(), 2);
    }
}
