//! Transport abstraction traits.
//!
//! A connector opens connections; a connection moves whole events in both
//! directions. Framing and encoding stay inside the implementation.

use async_trait::async_trait;
use thiserror::Error;
use tourney_protocol::{Event, ProtocolError};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open a connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be decoded. The connection stays usable.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server refused the session's identity.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),
}

impl TransportError {
    /// Whether the connection is still usable after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }
}

/// Opens connections to a realtime endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// An open realtime connection.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next event.
    ///
    /// Returns `None` if the connection is closed cleanly. A
    /// [`TransportError::Protocol`] error means one frame was dropped; the
    /// connection may still be read from. Must be cancel safe.
    async fn recv(&mut self) -> Result<Option<Event>, TransportError>;

    /// Send an event.
    async fn send(&mut self, event: &Event) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}
