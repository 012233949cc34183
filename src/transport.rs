//! Transport abstraction for the chat sync protocol.
//!
//! The [`Transport`] trait is a bidirectional text message channel between the
//! client and the server. Every frame is one JSON document, so implementations
//! handle framing internally (WebSocket frames, long-poll bodies, ...).
//!
//! Because the client reconnects on its own, it does not take a ready-made
//! transport. It takes a [`Connector`] that it can ask for a fresh transport on
//! every attempt.
//!
//! # Writing a transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use chat_sync_client::error::ChatError;
//! use chat_sync_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), ChatError> {
//!         self.outbound
//!             .send(frame)
//!             .map_err(|_| ChatError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ChatError>> {
//!         // `None` once the peer hangs up.
//!         self.inbound.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ChatError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::connection::{Identity, TransportKind};
use crate::error::ChatError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame and
/// each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), ChatError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Yields:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Opens transports on demand.
///
/// The client calls [`connect`](Connector::connect) once per connection
/// attempt, bounded by the configured timeout. The connector walks the
/// preference list and returns the first transport it can establish.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a transport to `endpoint`, identifying as `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnsupportedTransport`] when no kind in
    /// `transports` is supported, or the error of the last failed attempt.
    async fn connect(
        &self,
        endpoint: &str,
        identity: &Identity,
        transports: &[TransportKind],
    ) -> Result<Box<dyn Transport>, ChatError>;
}
