//! Peer presence map and the local heartbeat schedule.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::event::ChatEvent;
use crate::protocol::{HeartbeatPayload, Timestamp, UserId, UserStatus, UserStatusPayload};

/// Default interval between heartbeats while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Last known presence of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub user_name: String,
    pub status: UserStatus,
    /// When the update was applied locally, in epoch milliseconds.
    pub last_updated: Timestamp,
}

/// Tracks peer presence and when the next heartbeat is due.
///
/// An `OFFLINE` update removes the peer, so [`online_users`](Self::online_users)
/// never lists a user whose most recent update was `OFFLINE`.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    entries: HashMap<UserId, PresenceEntry>,
    local_status: UserStatus,
    interval: Duration,
    next_heartbeat: Option<Instant>,
}

impl PresenceTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            local_status: UserStatus::Online,
            interval,
            next_heartbeat: None,
        }
    }

    /// Apply a `user_status_updated` frame.
    pub fn apply(&mut self, update: UserStatusPayload, now: Timestamp) -> ChatEvent {
        if update.status == UserStatus::Offline {
            self.entries.remove(&update.user_id);
        } else {
            self.entries.insert(
                update.user_id,
                PresenceEntry {
                    user_id: update.user_id,
                    user_name: update.user_name.clone(),
                    status: update.status,
                    last_updated: now,
                },
            );
        }
        ChatEvent::UserStatusUpdated {
            user_id: update.user_id,
            user_name: update.user_name,
            status: update.status,
        }
    }

    /// Peers not known to be offline, in ascending id order.
    pub fn online_users(&self) -> Vec<PresenceEntry> {
        let mut users: Vec<PresenceEntry> = self.entries.values().cloned().collect();
        users.sort_by_key(|entry| entry.user_id);
        users
    }

    /// Last known status of `user`, or `None` if unknown or offline.
    pub fn status_of(&self, user: UserId) -> Option<UserStatus> {
        self.entries.get(&user).map(|entry| entry.status)
    }

    pub fn local_status(&self) -> UserStatus {
        self.local_status
    }

    pub fn set_local_status(&mut self, status: UserStatus) {
        self.local_status = status;
    }

    /// Start the heartbeat schedule; the first beat is one interval from `now`.
    pub fn arm_heartbeat(&mut self, now: Instant) {
        self.next_heartbeat = Some(now + self.interval);
    }

    /// Stop the heartbeat schedule.
    pub fn cancel_heartbeat(&mut self) {
        self.next_heartbeat = None;
    }

    pub fn heartbeat_deadline(&self) -> Option<Instant> {
        self.next_heartbeat
    }

    /// Returns a heartbeat payload when one is due and re-arms the schedule.
    pub fn poll_heartbeat(&mut self, now: Instant, timestamp: Timestamp) -> Option<HeartbeatPayload> {
        let due = self.next_heartbeat?;
        if due > now {
            return None;
        }
        self.next_heartbeat = Some(now + self.interval);
        debug!("heartbeat due");
        Some(HeartbeatPayload { timestamp })
    }

    /// Forget all peers and stop the heartbeat.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_heartbeat = None;
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

    fn update(user_id: UserId, status: UserStatus) -> UserStatusPayload {
        UserStatusPayload {
            user_id,
            user_name: format!("user-{user_id}"),
            status,
        }
    }

    #[test]
    fn latest_update_wins() {
        let mut presence = PresenceTracker::new(DEFAULT_HEARTBEAT_INTERVAL);
        presence.apply(update(1, UserStatus::Online), 10);
        presence.apply(update(1, UserStatus::Busy), 20);

        let users = presence.online_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, UserStatus::Busy);
        assert_eq!(users[0].last_updated, 20);
    }

    #[test]
    fn offline_removes_user() {
        let mut presence = PresenceTracker::new(DEFAULT_HEARTBEAT_INTERVAL);
        presence.apply(update(1, UserStatus::Online), 10);
        presence.apply(update(2, UserStatus::Away), 10);

        let event = presence.apply(update(1, UserStatus::Offline), 11);
        assert!(matches!(
            event,
            ChatEvent::UserStatusUpdated {
                user_id: 1,
                status: UserStatus::Offline,
                ..
            }
        ));
        assert_eq!(presence.status_of(1), None);
        let ids: Vec<UserId> = presence.online_users().iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn heartbeat_only_when_armed() {
        let mut presence = PresenceTracker::new(Duration::from_secs(30));
        let start = Instant::now();
        assert!(presence.poll_heartbeat(start + Duration::from_secs(60), 0).is_none());

        presence.arm_heartbeat(start);
        assert!(presence.poll_heartbeat(start + Duration::from_secs(29), 0).is_none());
        let beat = presence.poll_heartbeat(start + Duration::from_secs(30), 42);
        assert_eq!(beat, Some(HeartbeatPayload { timestamp: 42 }));
        assert_eq!(
            presence.heartbeat_deadline(),
            Some(start + Duration::from_secs(60))
        );

        presence.cancel_heartbeat();
        assert!(presence.poll_heartbeat(start + Duration::from_secs(90), 0).is_none());
    }
}
