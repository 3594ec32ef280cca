//! Streaming transport seam
//!
//! `Connector` opens one connection per connect cycle; the returned
//! `Transport` is owned by that cycle and dropped before the next one
//! starts. The production pair runs over TLS websockets; tests plug in a
//! scripted connector.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use types::errors::TransportError;

/// An inbound frame, independent of the websocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close => "close",
        }
    }
}

/// One open streaming connection.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame; `Ok(None)` once the stream has ended.
    ///
    /// Must be cancel-safe: the read loop races it against timers.
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Best-effort close.
    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self, endpoint: &str) -> Result<Self::Transport, TransportError>;
}

/// TLS websocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, endpoint: &str) -> Result<WsTransport, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let (stream, response) = timeout(self.connect_timeout, connect_async(endpoint))
            .await
            .map_err(|_| connect_error(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| connect_error(e.to_string()))?;

        debug!(endpoint, status = %response.status(), "Websocket handshake complete");
        Ok(WsTransport { stream })
    }
}

/// A websocket connection from `WsConnector`.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                Some(Ok(message)) => {
                    if let Some(frame) = frame_from_message(message) {
                        return Ok(Some(frame));
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Websocket close failed");
        }
    }
}

/// Map a websocket message to a frame; raw frames are never surfaced on read.
fn frame_from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        Message::Ping(bytes) => Some(Frame::Ping(bytes)),
        Message::Pong(bytes) => Some(Frame::Pong(bytes)),
        Message::Close(_) => Some(Frame::Close),
        Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_message() {
        assert_eq!(
            frame_from_message(Message::Text("{}".to_string())),
            Some(Frame::Text("{}".to_string()))
        );
        assert_eq!(
            frame_from_message(Message::Binary(vec![1, 2])),
            Some(Frame::Binary(vec![1, 2]))
        );
        assert_eq!(frame_from_message(Message::Close(None)), Some(Frame::Close));
        assert_eq!(frame_from_message(Message::Ping(vec![])), Some(Frame::Ping(vec![])));
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(Frame::Text(String::new()).kind(), "text");
        assert_eq!(Frame::Close.kind(), "close");
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        let connector = WsConnector::new(Duration::from_secs(2));
        let result = connector.connect("ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
