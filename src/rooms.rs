//! Room (activity) membership bookkeeping.
//!
//! The registry records the last transition the client *requested* for each
//! room and only accepts server acknowledgments that are a direct successor of
//! that request:
//!
//! | Requested     | Ack                | Result                              |
//! |---------------|--------------------|-------------------------------------|
//! | `PendingJoin` | `joined_room`      | `Joined`                            |
//! | `PendingJoin` | `join_room_error`  | removed (`NotJoined`)               |
//! | `PendingLeave`| `left_room`        | removed (`NotJoined`)               |
//! | `PendingLeave`| `leave_room_error` | `Joined` if it was joined, else removed |
//!
//! Anything else is stale and dropped with a log line.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::event::ChatEvent;
use crate::protocol::RoomId;

/// Membership state of one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomStatus {
    /// A `join_room` request is outstanding.
    PendingJoin,
    /// The server confirmed membership.
    Joined,
    /// A `leave_room` request is outstanding.
    PendingLeave,
    /// No membership and nothing outstanding.
    #[default]
    NotJoined,
}

/// What the registry stores per room. `NotJoined` is the absence of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    PendingJoin,
    Joined,
    /// `was_joined` remembers whether the server had confirmed membership
    /// before the leave was requested.
    PendingLeave { was_joined: bool },
}

impl From<Membership> for RoomStatus {
    fn from(membership: Membership) -> Self {
        match membership {
            Membership::PendingJoin => RoomStatus::PendingJoin,
            Membership::Joined => RoomStatus::Joined,
            Membership::PendingLeave { .. } => RoomStatus::PendingLeave,
        }
    }
}

/// Per-room subscription state.
#[derive(Debug, Clone, Default)]
pub struct RoomSubscriptionRegistry {
    rooms: HashMap<RoomId, Membership>,
}

impl RoomSubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of `room`; rooms without an entry are `NotJoined`.
    pub fn status(&self, room: RoomId) -> RoomStatus {
        self.rooms
            .get(&room)
            .map_or(RoomStatus::NotJoined, |m| RoomStatus::from(*m))
    }

    /// Rooms the server has confirmed, in ascending id order.
    pub fn joined_rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, membership)| **membership == Membership::Joined)
            .map(|(room, _)| *room)
            .collect();
        rooms.sort_unstable();
        rooms
    }

    /// Record a join request. A room that is already `Joined` stays `Joined`.
    pub fn request_join(&mut self, room: RoomId) {
        let membership = self.rooms.entry(room).or_insert(Membership::PendingJoin);
        if *membership != Membership::Joined {
            *membership = Membership::PendingJoin;
        }
    }

    /// Record a leave request.
    pub fn request_leave(&mut self, room: RoomId) {
        let was_joined = match self.rooms.get(&room) {
            Some(Membership::Joined) => true,
            Some(Membership::PendingLeave { was_joined }) => *was_joined,
            Some(Membership::PendingJoin) | None => false,
        };
        self.rooms
            .insert(room, Membership::PendingLeave { was_joined });
    }

    /// Server accepted a join.
    pub fn on_joined(&mut self, room: RoomId) -> Option<ChatEvent> {
        let status = self.status(room);
        if status != RoomStatus::PendingJoin {
            warn!(room, ?status, "ignoring stale joined_room ack");
            return None;
        }
        self.rooms.insert(room, Membership::Joined);
        debug!(room, "joined room");
        Some(ChatEvent::RoomJoined { room_id: room })
    }

    /// Server rejected a join.
    pub fn on_join_error(&mut self, room: RoomId, reason: Option<String>) -> Option<ChatEvent> {
        if self.status(room) != RoomStatus::PendingJoin {
            warn!(room, "ignoring stale join_room_error");
            return None;
        }
        self.rooms.remove(&room);
        Some(ChatEvent::RoomJoinError {
            room_id: room,
            reason,
        })
    }

    /// Server accepted a leave.
    pub fn on_left(&mut self, room: RoomId) -> Option<ChatEvent> {
        if self.status(room) != RoomStatus::PendingLeave {
            warn!(room, "ignoring stale left_room ack");
            return None;
        }
        self.rooms.remove(&room);
        debug!(room, "left room");
        Some(ChatEvent::RoomLeft { room_id: room })
    }

    /// Server rejected a leave. Membership goes back to what it was before
    /// the leave; an unconfirmed room is dropped.
    pub fn on_leave_error(&mut self, room: RoomId, reason: Option<String>) -> Option<ChatEvent> {
        let Some(Membership::PendingLeave { was_joined }) = self.rooms.get(&room).copied() else {
            warn!(room, "ignoring stale leave_room_error");
            return None;
        };
        if was_joined {
            self.rooms.insert(room, Membership::Joined);
        } else {
            self.rooms.remove(&room);
        }
        Some(ChatEvent::RoomLeaveError {
            room_id: room,
            reason,
        })
    }

    /// Prepare for a fresh transport.
    ///
    /// Membership does not survive the old socket, so every room that was
    /// joined or being joined goes back to `PendingJoin` and is returned for
    /// re-requesting. Outstanding leaves are dropped. With `rejoin` unset the
    /// registry is simply cleared.
    pub fn on_reconnect(&mut self, rejoin: bool) -> Vec<RoomId> {
        if !rejoin {
            self.rooms.clear();
            return Vec::new();
        }
        self.rooms
            .retain(|_, membership| !matches!(membership, Membership::PendingLeave { .. }));
        let mut rooms: Vec<RoomId> = self.rooms.keys().copied().collect();
        for membership in self.rooms.values_mut() {
            *membership = Membership::PendingJoin;
        }
        rooms.sort_unstable();
        rooms
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
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
    fn join_ack_moves_pending_to_joined() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(456);
        assert_eq!(rooms.status(456), RoomStatus::PendingJoin);

        let event = rooms.on_joined(456);
        assert_eq!(event, Some(ChatEvent::RoomJoined { room_id: 456 }));
        assert_eq!(rooms.status(456), RoomStatus::Joined);
        assert_eq!(rooms.joined_rooms(), vec![456]);
    }

    #[test]
    fn join_error_removes_entry_with_reason() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(7);
        let event = rooms.on_join_error(7, Some("full".into()));
        assert_eq!(
            event,
            Some(ChatEvent::RoomJoinError {
                room_id: 7,
                reason: Some("full".into())
            })
        );
        assert_eq!(rooms.status(7), RoomStatus::NotJoined);
    }

    #[test]
    fn unsolicited_join_ack_is_ignored() {
        let mut rooms = RoomSubscriptionRegistry::new();
        assert!(rooms.on_joined(99).is_none());
        assert_eq!(rooms.status(99), RoomStatus::NotJoined);
        assert!(rooms.joined_rooms().is_empty());
    }

    #[test]
    fn join_ack_after_leave_request_is_ignored() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(1);
        rooms.request_leave(1);
        assert!(rooms.on_joined(1).is_none());
        assert_eq!(rooms.status(1), RoomStatus::PendingLeave);

        assert_eq!(rooms.on_left(1), Some(ChatEvent::RoomLeft { room_id: 1 }));
        assert_eq!(rooms.status(1), RoomStatus::NotJoined);
    }

    #[test]
    fn repeated_join_keeps_joined() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(3);
        rooms.on_joined(3);
        rooms.request_join(3);
        assert_eq!(rooms.status(3), RoomStatus::Joined);
        // The duplicate ack is stale.
        assert!(rooms.on_joined(3).is_none());
    }

    #[test]
    fn leave_error_restores_joined() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(5);
        rooms.on_joined(5);
        rooms.request_leave(5);

        let event = rooms.on_leave_error(5, None);
        assert!(matches!(event, Some(ChatEvent::RoomLeaveError { room_id: 5, .. })));
        assert_eq!(rooms.status(5), RoomStatus::Joined);
    }

    #[test]
    fn stale_left_ack_is_ignored() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(8);
        assert!(rooms.on_left(8).is_none());
        assert_eq!(rooms.status(8), RoomStatus::PendingJoin);
    }

    #[test]
    fn reconnect_requeues_memberships() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(1);
        rooms.on_joined(1);
        rooms.request_join(2);
        rooms.request_join(3);
        rooms.on_joined(3);
        rooms.request_leave(3);

        let rejoin = rooms.on_reconnect(true);
        assert_eq!(rejoin, vec![1, 2]);
        assert_eq!(rooms.status(1), RoomStatus::PendingJoin);
        assert_eq!(rooms.status(2), RoomStatus::PendingJoin);
        assert_eq!(rooms.status(3), RoomStatus::NotJoined);
    }

    #[test]
    fn reconnect_without_rejoin_clears() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(1);
        rooms.on_joined(1);
        assert!(rooms.on_reconnect(false).is_empty());
        assert_eq!(rooms.status(1), RoomStatus::NotJoined);
    }

    #[test]
    fn leave_error_on_unconfirmed_room_never_joins() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_leave(42);
        assert!(rooms.on_leave_error(42, None).is_some());
        assert_eq!(rooms.status(42), RoomStatus::NotJoined);

        rooms.request_join(7);
        rooms.request_leave(7);
        assert!(rooms.on_join_error(7, None).is_none());
        assert!(rooms.on_leave_error(7, Some("not a member".into())).is_some());
        assert_eq!(rooms.status(7), RoomStatus::NotJoined);
        assert!(rooms.joined_rooms().is_empty());
    }

    #[test]
    fn repeated_leave_remembers_confirmed_membership() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(5);
        rooms.on_joined(5);
        rooms.request_leave(5);
        rooms.request_leave(5);
        rooms.on_leave_error(5, None);
        assert_eq!(rooms.status(5), RoomStatus::Joined);
    }

    #[test]
    fn join_then_leave_ends_not_joined_in_any_ack_order() {
        let mut rooms = RoomSubscriptionRegistry::new();
        rooms.request_join(1);
        rooms.request_leave(1);
        assert!(rooms.on_left(1).is_some());
        assert!(rooms.on_joined(1).is_none());
        assert_eq!(rooms.status(1), RoomStatus::NotJoined);

        rooms.request_join(2);
        rooms.request_leave(2);
        assert!(rooms.on_join_error(2, None).is_none());
        assert!(rooms.on_left(2).is_some());
        assert_eq!(rooms.status(2), RoomStatus::NotJoined);

        rooms.request_join(3);
        rooms.request_leave(3);
        assert!(rooms.on_left(3).is_some());
        assert!(rooms.on_join_error(3, None).is_none());
        assert_eq!(rooms.status(3), RoomStatus::NotJoined);
        assert!(rooms.joined_rooms().is_empty());
    }
}
