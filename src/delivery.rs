//! Session message log with delivery and read receipts.
//!
//! Messages are appended once and never removed during a session. Receipt
//! flags only ever move forward: `delivered` and `read` go from `false` to
//! `true`, and a read receipt for an undelivered message marks it delivered
//! first.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::event::ChatEvent;
use crate::protocol::{
    ChatMessagePayload, DeliveryStatusPayload, MessageAckPayload, MessageId, MessageType,
    ReadConfirmationPayload, Target, Timestamp, UserId,
};

/// Which way a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// How a message was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Private,
    Room,
    Broadcast,
    Announcement,
}

/// One entry of the session log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    /// For incoming private messages this is the local user.
    pub target: Target,
    pub content: String,
    pub message_type: MessageType,
    pub sent_at: Timestamp,
    pub delivered: bool,
    pub read: bool,
    pub read_at: Option<Timestamp>,
    pub direction: Direction,
    pub kind: MessageKind,
}

impl Message {
    /// Wire payload for an outgoing message.
    pub fn to_payload(&self) -> ChatMessagePayload {
        ChatMessagePayload {
            message_id: self.message_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name.clone(),
            content: self.content.clone(),
            message_type: self.message_type,
            timestamp: self.sent_at,
            room_id: self.target.room(),
            receiver_id: self.target.peer(),
        }
    }
}

/// Clock-based message ids that never repeat or go backwards.
#[derive(Debug, Clone, Default)]
pub struct MessageIdGenerator {
    last: MessageId,
}

impl MessageIdGenerator {
    /// Next id: the clock reading, bumped past the previous id if needed.
    pub fn next_id(&mut self, now: Timestamp) -> MessageId {
        let id = now.max(self.last.saturating_add(1));
        self.last = id;
        id
    }
}

/// Outcome of recording an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    /// The appended message, or `None` for a duplicate.
    pub message: Option<Message>,
    /// Delivery acknowledgment to send back.
    pub ack: MessageAckPayload,
}

/// Append-only message log keyed by `(sender, message id)`.
#[derive(Debug, Clone)]
pub struct MessageDeliveryTracker {
    user_id: UserId,
    user_name: String,
    ids: MessageIdGenerator,
    log: Vec<Message>,
    index: HashMap<(UserId, MessageId), usize>,
}

impl MessageDeliveryTracker {
    pub fn new(user_id: UserId, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            ids: MessageIdGenerator::default(),
            log: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Every message of the session, in append order.
    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    /// Look up a message by sender and id.
    pub fn message(&self, sender: UserId, id: MessageId) -> Option<&Message> {
        self.index.get(&(sender, id)).and_then(|&i| self.log.get(i))
    }

    fn message_mut(&mut self, sender: UserId, id: MessageId) -> Option<&mut Message> {
        let i = *self.index.get(&(sender, id))?;
        self.log.get_mut(i)
    }

    fn push(&mut self, message: Message) {
        self.index
            .insert((message.sender_id, message.message_id), self.log.len());
        self.log.push(message);
    }

    /// Append an outgoing message with both receipt flags unset.
    pub fn record_outgoing(
        &mut self,
        kind: MessageKind,
        target: Target,
        content: String,
        message_type: MessageType,
        now: Timestamp,
    ) -> Message {
        let message = Message {
            message_id: self.ids.next_id(now),
            sender_id: self.user_id,
            sender_name: self.user_name.clone(),
            target,
            content,
            message_type,
            sent_at: now,
            delivered: false,
            read: false,
            read_at: None,
            direction: Direction::Outgoing,
            kind,
        };
        self.push(message.clone());
        message
    }

    /// Record a message authored by a peer.
    ///
    /// Returns `None` for our own messages echoed back by the server; those
    /// are neither appended nor acknowledged.
    pub fn record_incoming(
        &mut self,
        payload: ChatMessagePayload,
        kind: MessageKind,
    ) -> Option<Received> {
        if payload.sender_id == self.user_id {
            debug!(message_id = payload.message_id, "ignoring echo of own message");
            return None;
        }
        let ack = MessageAckPayload {
            message_id: payload.message_id,
            sender_id: payload.sender_id,
        };
        if self.message(payload.sender_id, payload.message_id).is_some() {
            debug!(
                message_id = payload.message_id,
                sender = payload.sender_id,
                "duplicate message, re-acknowledging"
            );
            return Some(Received { message: None, ack });
        }

        let target = payload.target().unwrap_or(Target::Peer(self.user_id));
        let message = Message {
            message_id: payload.message_id,
            sender_id: payload.sender_id,
            sender_name: payload.sender_name,
            target,
            content: payload.content,
            message_type: payload.message_type,
            sent_at: payload.timestamp,
            delivered: true,
            read: false,
            read_at: None,
            direction: Direction::Incoming,
            kind,
        };
        self.push(message.clone());
        Some(Received {
            message: Some(message),
            ack,
        })
    }

    /// Apply a `message_delivery_status` frame for one of our messages.
    pub fn on_delivery_status(&mut self, status: DeliveryStatusPayload) -> Option<ChatEvent> {
        if !status.delivered {
            return None;
        }
        let user_id = self.user_id;
        let Some(message) = self.message_mut(user_id, status.message_id) else {
            warn!(message_id = status.message_id, "delivery status for unknown message");
            return None;
        };
        if message.delivered {
            return None;
        }
        message.delivered = true;
        Some(ChatEvent::MessageDelivered {
            message_id: status.message_id,
        })
    }

    /// Apply a `message_read_confirmation` frame for one of our messages.
    pub fn on_read_confirmation(
        &mut self,
        confirmation: ReadConfirmationPayload,
        now: Timestamp,
    ) -> Vec<ChatEvent> {
        let user_id = self.user_id;
        let Some(message) = self.message_mut(user_id, confirmation.message_id) else {
            warn!(
                message_id = confirmation.message_id,
                "read confirmation for unknown message"
            );
            return Vec::new();
        };

        let mut events = Vec::new();
        if !message.delivered {
            message.delivered = true;
            events.push(ChatEvent::MessageDelivered {
                message_id: confirmation.message_id,
            });
        }
        if !message.read {
            message.read = true;
            message.read_at = Some(confirmation.read_at.unwrap_or(now));
            events.push(ChatEvent::MessageRead {
                message_id: confirmation.message_id,
                read_at: message.read_at,
            });
        }
        events
    }

    /// Mark an inbound message read locally.
    ///
    /// Returns the receipt payload to send; unknown messages still produce
    /// one, since the server may know about them.
    pub fn mark_read(&mut self, sender: UserId, id: MessageId, now: Timestamp) -> MessageAckPayload {
        if let Some(message) = self.message_mut(sender, id) {
            if !message.read {
                message.read = true;
                message.read_at = Some(now);
            }
        }
        MessageAckPayload {
            message_id: id,
            sender_id: sender,
        }
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.index.clear();
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

    fn tracker() -> MessageDeliveryTracker {
        MessageDeliveryTracker::new(1, "alice")
    }

    fn incoming(sender_id: UserId, message_id: MessageId) -> ChatMessagePayload {
        ChatMessagePayload {
            message_id,
            sender_id,
            sender_name: "bob".into(),
            content: "hi".into(),
            message_type: MessageType::Text,
            timestamp: 5,
            room_id: Some(456),
            receiver_id: None,
        }
    }

    #[test]
    fn ids_are_strictly_increasing_under_a_frozen_clock() {
        let mut ids = MessageIdGenerator::default();
        let a = ids.next_id(1000);
        let b = ids.next_id(1000);
        let c = ids.next_id(999);
        let d = ids.next_id(5000);
        assert!(a < b && b < c && c < d);
        assert_eq!(d, 5000);
    }

    #[test]
    fn outgoing_starts_undelivered() {
        let mut delivery = tracker();
        let sent = delivery.record_outgoing(
            MessageKind::Room,
            Target::Room(456),
            "hello".into(),
            MessageType::Text,
            100,
        );
        assert!(!sent.delivered);
        assert!(!sent.read);
        assert_eq!(sent.direction, Direction::Outgoing);
        assert_eq!(delivery.messages().len(), 1);

        let payload = sent.to_payload();
        assert_eq!(payload.room_id, Some(456));
        assert_eq!(payload.receiver_id, None);
    }

    #[test]
    fn delivery_status_is_monotonic() {
        let mut delivery = tracker();
        let sent = delivery.record_outgoing(
            MessageKind::Private,
            Target::Peer(2),
            "x".into(),
            MessageType::Text,
            100,
        );
        let id = sent.message_id;

        let event = delivery.on_delivery_status(DeliveryStatusPayload {
            message_id: id,
            delivered: true,
        });
        assert_eq!(event, Some(ChatEvent::MessageDelivered { message_id: id }));

        let event = delivery.on_delivery_status(DeliveryStatusPayload {
            message_id: id,
            delivered: false,
        });
        assert!(event.is_none());
        assert!(delivery.message(1, id).unwrap().delivered);
    }

    #[test]
    fn read_before_delivery_marks_both() {
        let mut delivery = tracker();
        let id = delivery
            .record_outgoing(
                MessageKind::Private,
                Target::Peer(2),
                "x".into(),
                MessageType::Text,
                100,
            )
            .message_id;

        let events = delivery.on_read_confirmation(
            ReadConfirmationPayload {
                message_id: id,
                read_at: Some(777),
            },
            900,
        );
        let names: Vec<&str> = events.iter().map(ChatEvent::name).collect();
        assert_eq!(names, vec!["message_delivered", "message_read"]);

        let message = delivery.message(1, id).unwrap();
        assert!(message.delivered && message.read);
        assert_eq!(message.read_at, Some(777));

        // A late delivery status changes nothing.
        assert!(delivery
            .on_delivery_status(DeliveryStatusPayload {
                message_id: id,
                delivered: true
            })
            .is_none());
    }

    #[test]
    fn incoming_is_delivered_and_acked_once_appended() {
        let mut delivery = tracker();
        let first = delivery.record_incoming(incoming(2, 10), MessageKind::Room).unwrap();
        let message = first.message.unwrap();
        assert!(message.delivered);
        assert_eq!(message.direction, Direction::Incoming);
        assert_eq!(first.ack, MessageAckPayload { message_id: 10, sender_id: 2 });

        let dup = delivery.record_incoming(incoming(2, 10), MessageKind::Room).unwrap();
        assert!(dup.message.is_none());
        assert_eq!(dup.ack.message_id, 10);
        assert_eq!(delivery.messages().len(), 1);

        // Same id from another sender is a different message.
        delivery.record_incoming(incoming(3, 10), MessageKind::Room).unwrap();
        assert_eq!(delivery.messages().len(), 2);
    }

    #[test]
    fn own_echo_is_skipped() {
        let mut delivery = tracker();
        assert!(delivery.record_incoming(incoming(1, 10), MessageKind::Room).is_none());
        assert!(delivery.messages().is_empty());
    }

    #[test]
    fn mark_read_updates_incoming() {
        let mut delivery = tracker();
        delivery.record_incoming(incoming(2, 10), MessageKind::Room);
        let ack = delivery.mark_read(2, 10, 1234);
        assert_eq!(ack, MessageAckPayload { message_id: 10, sender_id: 2 });
        let message = delivery.message(2, 10).unwrap();
        assert!(message.read);
        assert_eq!(message.read_at, Some(1234));
    }

    #[test]
    fn receipts_for_unknown_messages_are_ignored() {
        let mut delivery = tracker();
        assert!(delivery
            .on_delivery_status(DeliveryStatusPayload {
                message_id: 42,
                delivered: true
            })
            .is_none());
        assert!(delivery
            .on_read_confirmation(
                ReadConfirmationPayload {
                    message_id: 42,
                    read_at: None
                },
                1
            )
            .is_empty());
    }
}
