//! Typing indicators, local and remote.
//!
//! The local half debounces keystrokes into a `typing_start` / `typing_stop`
//! pair per burst: the first keystroke sends `typing_start`, every keystroke
//! pushes the silence deadline out, and the deadline (or an explicit stop)
//! sends exactly one `typing_stop`.
//!
//! The remote half keeps one entry per peer. Each entry carries an absolute
//! expiry so a peer whose stop signal was lost does not appear to type
//! forever.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::protocol::{ClientMessage, Target, TypingPayload, UserId};

/// Silence after which the local user is considered to have stopped typing.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(3000);

/// Backstop expiry for remote typing entries.
pub const DEFAULT_REMOTE_TYPING_EXPIRY: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
struct RemoteTyping {
    user_name: String,
    scope: Target,
    expires_at: Instant,
}

/// Typing state for one session.
#[derive(Debug, Clone)]
pub struct TypingIndicatorTracker {
    user_id: UserId,
    user_name: String,
    silence: Duration,
    remote_expiry: Duration,
    active_scope: Option<Target>,
    typing_in: Option<Target>,
    /// Burst cut short by a lost transport; peers still see it.
    interrupted: Option<Target>,
    silence_deadline: Option<Instant>,
    remote: HashMap<UserId, RemoteTyping>,
}

impl TypingIndicatorTracker {
    pub fn new(
        user_id: UserId,
        user_name: impl Into<String>,
        silence: Duration,
        remote_expiry: Duration,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            silence,
            remote_expiry,
            active_scope: None,
            typing_in: None,
            interrupted: None,
            silence_deadline: None,
            remote: HashMap::new(),
        }
    }

    // ── Local ───────────────────────────────────────────────────────

    pub fn active_scope(&self) -> Option<Target> {
        self.active_scope
    }

    /// Returns `true` between a sent `typing_start` and its `typing_stop`.
    pub fn is_typing(&self) -> bool {
        self.typing_in.is_some()
    }

    /// Select the room or peer being typed into.
    ///
    /// Switching away while typing stops typing in the old scope.
    pub fn set_active_scope(&mut self, scope: Option<Target>) -> Option<ClientMessage> {
        if self.active_scope == scope {
            return None;
        }
        let stop = if self.typing_in.is_some_and(|current| Some(current) != scope) {
            self.stop()
        } else {
            None
        };
        self.active_scope = scope;
        stop
    }

    /// Register a keystroke in the active scope.
    ///
    /// Returns `typing_start` on the first keystroke of a burst.
    ///
    /// # Errors
    ///
    /// [`ChatError::NoActiveScope`] when no room or peer is selected.
    pub fn input(&mut self, now: Instant) -> Result<Option<ClientMessage>> {
        let scope = self.active_scope.ok_or(ChatError::NoActiveScope)?;
        self.silence_deadline = Some(now + self.silence);
        if self.typing_in.is_some() {
            return Ok(None);
        }
        self.typing_in = Some(scope);
        Ok(Some(ClientMessage::TypingStart(TypingPayload::new(
            self.user_id,
            self.user_name.clone(),
            scope,
        ))))
    }

    /// End the current burst. Returns `None` when not typing.
    pub fn stop(&mut self) -> Option<ClientMessage> {
        self.silence_deadline = None;
        let scope = self.typing_in.take()?;
        Some(ClientMessage::TypingStop(TypingPayload::new(
            self.user_id,
            self.user_name.clone(),
            scope,
        )))
    }

    /// A message was sent to `target`; typing there is over.
    pub fn on_message_sent(&mut self, target: Target) -> Option<ClientMessage> {
        if self.typing_in == Some(target) {
            self.stop()
        } else {
            None
        }
    }

    /// The transport dropped. An open burst is parked until
    /// [`resume`](Self::resume) can close it on the next connection.
    pub fn interrupt(&mut self) {
        self.silence_deadline = None;
        if let Some(scope) = self.typing_in.take() {
            self.interrupted = Some(scope);
        }
    }

    /// A new connection is up. Returns the `typing_stop` owed for a burst
    /// the previous connection cut short.
    pub fn resume(&mut self) -> Option<ClientMessage> {
        let scope = self.interrupted.take()?;
        debug!(?scope, "closing typing burst interrupted by reconnect");
        Some(ClientMessage::TypingStop(TypingPayload::new(
            self.user_id,
            self.user_name.clone(),
            scope,
        )))
    }

    // ── Remote ──────────────────────────────────────────────────────

    /// A peer started typing.
    ///
    /// Private signals are scoped to the sending peer. Room signals are
    /// dropped unless they are for the locally active room.
    pub fn remote_start(
        &mut self,
        payload: TypingPayload,
        private: bool,
        now: Instant,
    ) -> Option<ChatEvent> {
        if payload.user_id == self.user_id {
            return None;
        }
        let scope = self.remote_scope(&payload, private)?;
        let expires_at = now + self.remote_expiry;
        let previous = self.remote.insert(
            payload.user_id,
            RemoteTyping {
                user_name: payload.user_name.clone(),
                scope,
                expires_at,
            },
        );
        if previous.is_some_and(|p| p.scope == scope) {
            return None;
        }
        Some(ChatEvent::UserTyping {
            user_id: payload.user_id,
            user_name: payload.user_name,
            scope,
        })
    }

    /// A peer stopped typing.
    pub fn remote_stop(&mut self, payload: &TypingPayload, private: bool) -> Option<ChatEvent> {
        let scope = self.remote_scope(payload, private)?;
        match self.remote.get(&payload.user_id) {
            Some(entry) if entry.scope == scope => {}
            _ => return None,
        }
        self.remote.remove(&payload.user_id);
        Some(ChatEvent::UserStoppedTyping {
            user_id: payload.user_id,
            scope,
            expired: false,
        })
    }

    fn remote_scope(&self, payload: &TypingPayload, private: bool) -> Option<Target> {
        if private {
            return Some(Target::Peer(payload.user_id));
        }
        let room = payload.room_id?;
        if self.active_scope != Some(Target::Room(room)) {
            debug!(room, user = payload.user_id, "ignoring typing for inactive room");
            return None;
        }
        Some(Target::Room(room))
    }

    /// Peers currently typing in `scope`, in ascending id order.
    pub fn typing_users(&self, scope: Target) -> Vec<(UserId, String)> {
        let mut users: Vec<(UserId, String)> = self
            .remote
            .iter()
            .filter(|(_, entry)| entry.scope == scope)
            .map(|(id, entry)| (*id, entry.user_name.clone()))
            .collect();
        users.sort_by_key(|(id, _)| *id);
        users
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Earliest pending deadline, local or remote.
    pub fn next_deadline(&self) -> Option<Instant> {
        let remote = self.remote.values().map(|entry| entry.expires_at).min();
        match (self.silence_deadline, remote) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline at or before `now`.
    ///
    /// Returns the local `typing_stop` (if the silence window elapsed) and one
    /// `user_stopped_typing` event per expired peer.
    pub fn poll(&mut self, now: Instant) -> (Option<ClientMessage>, Vec<ChatEvent>) {
        let stop = match self.silence_deadline {
            Some(deadline) if deadline <= now => self.stop(),
            _ => None,
        };

        let mut expired: Vec<(UserId, Target)> = self
            .remote
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, entry)| (*id, entry.scope))
            .collect();
        expired.sort_by_key(|(id, _)| *id);

        let events = expired
            .into_iter()
            .map(|(user_id, scope)| {
                self.remote.remove(&user_id);
                ChatEvent::UserStoppedTyping {
                    user_id,
                    scope,
                    expired: true,
                }
            })
            .collect();
        (stop, events)
    }

    /// Drop everything, local and remote, without wire traffic.
    pub fn clear(&mut self) {
        self.typing_in = None;
        self.interrupted = None;
        self.silence_deadline = None;
        self.remote.clear();
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

    fn tracker() -> TypingIndicatorTracker {
        TypingIndicatorTracker::new(
            1,
            "alice",
            DEFAULT_TYPING_TIMEOUT,
            DEFAULT_REMOTE_TYPING_EXPIRY,
        )
    }

    fn room_typing(user_id: UserId, room: u64) -> TypingPayload {
        TypingPayload::new(user_id, format!("user-{user_id}"), Target::Room(room))
    }

    fn private_typing(user_id: UserId) -> TypingPayload {
        TypingPayload::new(user_id, format!("user-{user_id}"), Target::Peer(1))
    }

    #[test]
    fn input_without_scope_fails() {
        let mut typing = tracker();
        assert!(matches!(
            typing.input(Instant::now()),
            Err(ChatError::NoActiveScope)
        ));
    }

    #[test]
    fn burst_sends_one_start_and_one_stop() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Room(456)));
        let start = Instant::now();

        let mut starts = 0;
        for i in 0..10u64 {
            if let Some(msg) = typing.input(start + Duration::from_millis(i * 500)).unwrap() {
                assert_eq!(msg.event_name(), "typing_start");
                starts += 1;
            }
        }
        assert_eq!(starts, 1);

        // Last keystroke at 4500ms; silence deadline at 7500ms.
        let (stop, _) = typing.poll(start + Duration::from_millis(7499));
        assert!(stop.is_none());
        let (stop, _) = typing.poll(start + Duration::from_millis(7500));
        assert_eq!(stop.map(|m| m.event_name()), Some("typing_stop"));
        let (stop, _) = typing.poll(start + Duration::from_millis(20_000));
        assert!(stop.is_none());
        assert!(!typing.is_typing());
    }

    #[test]
    fn start_payload_populates_one_scope_field() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Peer(9)));
        let msg = typing.input(Instant::now()).unwrap().unwrap();
        match msg {
            ClientMessage::TypingStart(payload) => {
                assert_eq!(payload.receiver_id, Some(9));
                assert_eq!(payload.room_id, None);
                assert_eq!(payload.user_name, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switching_scope_stops_old_scope() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Room(1)));
        typing.input(Instant::now()).unwrap();

        let stop = typing.set_active_scope(Some(Target::Room(2))).unwrap();
        match stop {
            ClientMessage::TypingStop(payload) => assert_eq!(payload.room_id, Some(1)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!typing.is_typing());
        assert!(typing.next_deadline().is_none());
    }

    #[test]
    fn sending_message_stops_typing_in_that_scope() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Room(1)));
        typing.input(Instant::now()).unwrap();

        assert!(typing.on_message_sent(Target::Room(2)).is_none());
        assert!(typing.on_message_sent(Target::Room(1)).is_some());
        assert!(typing.stop().is_none());
    }

    #[test]
    fn remote_room_typing_requires_active_room() {
        let mut typing = tracker();
        let now = Instant::now();
        assert!(typing.remote_start(room_typing(2, 456), false, now).is_none());

        typing.set_active_scope(Some(Target::Room(456)));
        let event = typing.remote_start(room_typing(2, 456), false, now);
        assert!(matches!(event, Some(ChatEvent::UserTyping { user_id: 2, .. })));
        assert_eq!(typing.typing_users(Target::Room(456)).len(), 1);
    }

    #[test]
    fn remote_private_typing_is_scoped_to_sender() {
        let mut typing = tracker();
        let now = Instant::now();
        let event = typing.remote_start(private_typing(7), true, now).unwrap();
        assert_eq!(
            event,
            ChatEvent::UserTyping {
                user_id: 7,
                user_name: "user-7".into(),
                scope: Target::Peer(7),
            }
        );
        // Repeated start only refreshes the expiry.
        assert!(typing.remote_start(private_typing(7), true, now).is_none());

        let stop = typing.remote_stop(&private_typing(7), true);
        assert!(matches!(
            stop,
            Some(ChatEvent::UserStoppedTyping { expired: false, .. })
        ));
        assert!(typing.remote_stop(&private_typing(7), true).is_none());
    }

    #[test]
    fn own_typing_echo_is_ignored() {
        let mut typing = tracker();
        assert!(typing
            .remote_start(private_typing(1), true, Instant::now())
            .is_none());
    }

    #[test]
    fn lost_stop_signal_expires() {
        let mut typing = tracker();
        let start = Instant::now();
        typing.remote_start(private_typing(3), true, start);
        assert_eq!(
            typing.next_deadline(),
            Some(start + DEFAULT_REMOTE_TYPING_EXPIRY)
        );

        let (_, events) = typing.poll(start + Duration::from_millis(9_999));
        assert!(events.is_empty());
        let (_, events) = typing.poll(start + DEFAULT_REMOTE_TYPING_EXPIRY);
        assert_eq!(
            events,
            vec![ChatEvent::UserStoppedTyping {
                user_id: 3,
                scope: Target::Peer(3),
                expired: true,
            }]
        );
        assert!(typing.typing_users(Target::Peer(3)).is_empty());
    }

    #[test]
    fn clear_drops_everything_silently() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Room(1)));
        typing.input(Instant::now()).unwrap();
        typing.remote_start(private_typing(3), true, Instant::now());

        typing.clear();
        assert!(!typing.is_typing());
        assert!(typing.next_deadline().is_none());
        assert!(typing.stop().is_none());
    }

    #[test]
    fn interrupted_burst_is_stopped_once_on_resume() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Room(456)));
        typing.input(Instant::now()).unwrap();

        typing.interrupt();
        assert!(!typing.is_typing());
        assert!(typing.next_deadline().is_none());

        assert!(matches!(
            typing.resume(),
            Some(ClientMessage::TypingStop(TypingPayload {
                room_id: Some(456),
                ..
            }))
        ));
        assert!(typing.resume().is_none());

        let start = typing.input(Instant::now()).unwrap();
        assert!(matches!(start, Some(ClientMessage::TypingStart(_))));
    }

    #[test]
    fn clear_forgets_interrupted_burst() {
        let mut typing = tracker();
        typing.set_active_scope(Some(Target::Peer(2)));
        typing.input(Instant::now()).unwrap();
        typing.interrupt();
        typing.clear();
        assert!(typing.resume().is_none());
    }
}
