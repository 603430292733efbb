//! WebSocket connector.
//!
//! Events travel as JSON envelopes in text frames, one event per frame.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tourney_protocol::{codec, Event, ProtocolError, MAX_FRAME_SIZE};
use tracing::{debug, warn};

use crate::traits::{Connection, Connector, TransportError};

/// Opens WebSocket connections.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    max_message_size: usize,
}

impl WebSocketConnector {
    /// Create a connector that refuses inbound frames above `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(url, status = %response.status(), "WebSocket handshake completed");

        Ok(Box::new(WebSocketConnection {
            stream,
            is_open: true,
            max_message_size: self.max_message_size,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client WebSocket connection.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    is_open: bool,
    max_message_size: usize,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<Event>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > self.max_message_size {
                        warn!(
                            size = text.len(),
                            max = self.max_message_size,
                            "Message too large"
                        );
                        return Err(ProtocolError::FrameTooLarge(text.len()).into());
                    }
                    return Ok(Some(codec::decode(&text)?));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(size = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!("WebSocket closed by peer");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, event: &Event) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        let text = codec::encode(event)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(());
        }
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {e}"))),
        }
    }
}
