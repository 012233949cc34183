//! # Chat Sync Client
//!
//! Transport-agnostic Rust client for a real-time chat synchronization
//! protocol: connection lifecycle with bounded reconnection, room membership,
//! presence with heartbeats, typing indicators, delivery and read receipts,
//! and transient notifications.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **Self-healing**: reconnects with exponential backoff and rejoins rooms
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **Event-driven**: register callbacks per event name with [`ChatClient::on`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> chat_sync_client::Result<()> {
//! use chat_sync_client::{handler, ChatClient, ChatConfig, Identity, MessageType, WebSocketConnector};
//!
//! let client = ChatClient::new(
//!     WebSocketConnector::new(),
//!     "ws://localhost:3001",
//!     Identity::new(7, "Alice"),
//!     ChatConfig::default(),
//! );
//! client.on("message_received", handler(|event| println!("{event:?}")));
//! client.connect();
//!
//! // Once `connected` has fired:
//! client.join_room(456)?;
//! client.send_room_message(456, "hello", MessageType::Text)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod notifications;
pub mod presence;
pub mod protocol;
pub mod rooms;
mod session;
pub mod transport;
pub mod transports;
pub mod typing;

// Re-export primary types for ergonomic imports.
pub use client::ChatClient;
pub use connection::{ConnectionConfig, ConnectionState, Identity, TransportKind};
pub use delivery::{Direction, Message, MessageKind};
pub use dispatcher::{handler, EventDispatcher, Handler};
pub use error::{ChatError, Result};
pub use event::ChatEvent;
pub use notifications::{NotificationItem, NotificationKind};
pub use presence::PresenceEntry;
pub use protocol::{
    AlertType, ClientMessage, MessageType, RoomId, ServerMessage, Target, UserId, UserStatus,
};
pub use rooms::RoomStatus;
pub use session::ChatConfig;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
