//! Error types for the chat sync client.

use thiserror::Error;

use crate::connection::TransportKind;

/// Errors that can occur when using the chat sync client.
///
/// Transport failures never reach application calls directly: the session
/// loop absorbs them into the reconnection state machine and reports them as
/// lifecycle events. The variants an application sees from a client method
/// are the misuse variants ([`NotConnected`](ChatError::NotConnected),
/// [`NoActiveScope`](ChatError::NoActiveScope)).
#[derive(Debug, Error)]
pub enum ChatError {
    /// Writing a frame to the transport failed.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Reading a frame from the transport failed.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// None of the preferred transports is supported by the connector.
    #[error("no supported transport in preference list (last tried: {0:?})")]
    UnsupportedTransport(Option<TransportKind>),

    /// A frame could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation needs a live connection and there is none.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a typing operation without selecting a room or peer first.
    #[error("no active typing scope")]
    NoActiveScope,

    /// A connection attempt exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// Opening the underlying socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for chat sync client operations.
pub type Result<T> = std::result::Result<T, ChatError>;
